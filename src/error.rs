use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("OpenCV error {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Error loading face cascade {0:?}")]
    CascadeLoad(String),

    #[error("Could not start video capture on camera {0}")]
    CaptureUnavailable(i32),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("GPU error {0}")]
    Gpu(String),
}

impl Error {
    /// Process exit code for errors that abort startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CascadeLoad(_) => -1,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
