use clap::Parser;
use opencv::highgui;
use opencv::prelude::*;
use std::path::PathBuf;
use virtual_window::{CascadeFaceDetector, Config, FrameProcessor};

/// Estimate the head position from a single image.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Image to process.
    image: PathBuf,

    /// Config file in YAML format.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Show the annotated image.
    #[clap(long)]
    show: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let image_path = args
        .image
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("image path is not valid UTF-8"))?;
    let frame = opencv::imgcodecs::imread_def(image_path)?;
    if frame.size()?.width == 0 {
        anyhow::bail!("Failed to read image {}", image_path);
    }
    let size = frame.size()?;

    let detector = CascadeFaceDetector::new(&config.detection)?;
    let mut processor = FrameProcessor::new(
        detector,
        config.intrinsics(size.width, size.height),
        config.eye_model(),
        config.camera.mirror,
    );
    let processed = processor.process_frame(&frame, true)?;

    match (processed.face, processed.head_position) {
        (Some(face), Some(head)) => {
            println!(
                "face: x={} y={} w={} h={}",
                face.x, face.y, face.width, face.height
            );
            println!("head: ({:.2}, {:.2}, {:.2}) cm", head.x, head.y, head.z);
        }
        (Some(face), None) => println!("degenerate face {:?}", face),
        (None, _) => println!("no face found"),
    }

    if args.show {
        let window = "locate head";
        highgui::named_window_def(window)?;
        highgui::imshow(window, &processed.image)?;
        highgui::wait_key(0)?;
    }

    Ok(())
}
