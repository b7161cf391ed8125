use thiserror::Error;

/// Errors surfaced by the camera session layer.
///
/// A decode attempt that finds no symbol is not an error and never appears
/// here; see [`crate::decode::DecodeOutcome`].
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera available on this device")]
    NoCameraAvailable,

    #[error("requested camera {index} does not exist")]
    NoSuchDevice { index: u32 },

    #[error("camera device busy: {details}")]
    DeviceBusy { details: String },

    #[error("camera rejected configuration: {details}")]
    ConfigurationRejected { details: String },

    #[error("fatal camera hardware error: {details}")]
    Fatal { details: String },
}

impl CameraError {
    pub fn busy<S: Into<String>>(details: S) -> Self {
        Self::DeviceBusy {
            details: details.into(),
        }
    }

    pub fn rejected<S: Into<String>>(details: S) -> Self {
        Self::ConfigurationRejected {
            details: details.into(),
        }
    }

    pub fn fatal<S: Into<String>>(details: S) -> Self {
        Self::Fatal {
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ScancamError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("decode worker error: {message}")]
    Worker { message: String },

    #[error("component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScancamError {
    pub fn worker<S: Into<String>>(message: S) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScancamError>;
