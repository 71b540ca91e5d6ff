use clap::Parser;
use log::{error, info};
use opencv::highgui;
use std::path::PathBuf;
use std::sync::mpsc;
use virtual_window::config::EXAMPLE_CONFIG;
use virtual_window::{
    App, CameraSource, CascadeFaceDetector, Config, Error, Event, GpuSceneRenderer, Response,
    WindowDimensions,
};

#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// Config file in YAML format.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Camera index, overrides the config file.
    #[clap(long)]
    camera: Option<i32>,

    /// Haar cascade file, overrides the config file.
    #[clap(long)]
    cascade: Option<PathBuf>,

    /// Start in fullscreen.
    #[clap(short, long)]
    fullscreen: bool,

    /// Enable debug output.
    #[clap(short, long)]
    debug: bool,

    /// Print an example config and exit.
    #[clap(long)]
    print_config: bool,
}

fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(filter));

    if args.print_config {
        print!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(camera) = args.camera {
        config.camera.index = camera;
    }
    if let Some(cascade) = args.cascade {
        config.detection.cascade = cascade;
    }
    config.display.fullscreen |= args.fullscreen;
    config.validate()?;

    match run(&config) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<Error>() {
            Some(fatal @ (Error::CascadeLoad(_) | Error::CaptureUnavailable(_) | Error::Gpu(_))) => {
                error!("{}", fatal);
                std::process::exit(fatal.exit_code());
            }
            _ => Err(err),
        },
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    let detector = CascadeFaceDetector::new(&config.detection)?;
    let source = CameraSource::new(config.camera.index)?;
    let renderer = GpuSceneRenderer::virtual_window(&config.scene)?;
    let mut app = App::new(config, source, detector, renderer);

    let window = config.display.title.as_str();
    highgui::named_window(window, highgui::WINDOW_NORMAL)?;
    let size = app.window();
    let (x, y) = config.display.window_position;
    highgui::resize_window(window, size.width, size.height)?;
    highgui::move_window(window, x, y)?;
    info!("Opened {}x{} window", size.width, size.height);

    if config.display.fullscreen {
        let response = app.dispatch(Event::Key(i32::from(b'f')))?;
        apply(window, response)?;
    }

    let (mouse_sender, mouse_events) = mpsc::channel();
    highgui::set_mouse_callback(
        window,
        Some(Box::new(move |event, x, y, _flags| {
            _ = mouse_sender.send(Event::Mouse { event, x, y });
        })),
    )?;

    let mut last_size = WindowDimensions::new(0, 0);
    while app.is_running() {
        let mut events = Vec::new();

        // also pumps the window's event queue
        let key = highgui::wait_key_ex(1)?;
        if key >= 0 {
            events.push(Event::Key(key));
        }

        let rect = highgui::get_window_image_rect(window)?;
        let size = WindowDimensions::new(rect.width, rect.height);
        if size != last_size && size.width > 0 && size.height > 0 {
            last_size = size;
            events.push(Event::Resize {
                width: size.width,
                height: size.height,
            });
        }

        events.extend(mouse_events.try_iter());
        // continuous redraw
        events.push(Event::Idle);
        events.push(Event::Render);

        for event in events {
            let response = app.dispatch(event)?;
            apply(window, response)?;
            if !app.is_running() {
                break;
            }
        }
    }

    highgui::destroy_all_windows()?;
    Ok(())
}

fn apply(window: &str, response: Response) -> opencv::Result<()> {
    match response {
        Response::Present(canvas) => highgui::imshow(window, &canvas)?,
        Response::EnterFullscreen => highgui::set_window_property(
            window,
            highgui::WND_PROP_FULLSCREEN,
            f64::from(highgui::WINDOW_FULLSCREEN),
        )?,
        Response::LeaveFullscreen { size, position } => {
            highgui::set_window_property(
                window,
                highgui::WND_PROP_FULLSCREEN,
                f64::from(highgui::WINDOW_NORMAL),
            )?;
            highgui::resize_window(window, size.width, size.height)?;
            highgui::move_window(window, position.0, position.1)?;
        }
        Response::Continue | Response::Skip | Response::Quit => {}
    }
    Ok(())
}
