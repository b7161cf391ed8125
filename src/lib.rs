pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod focus;
pub mod frame;
pub mod geometry;
pub mod hardware;
pub mod negotiate;
pub mod session;
pub mod tuning;
pub mod worker;

#[cfg(feature = "qr")]
pub mod qr;

pub use config::{CameraConfig, DecodeConfig, FocusConfig, FramingConfig, ScancamConfig};
pub use controller::{PreviewController, ResultSink, SessionState};
pub use decode::{DecodeOutcome, DecodeSuccess, DecodedSymbol, Decoder, SymbolFormat};
pub use error::{CameraError, Result, ScancamError};
pub use focus::{AutoFocusController, FocusDriver, FocusState};
pub use frame::{LuminanceSource, PreviewFrame, Thumbnail};
pub use geometry::{CameraFacing, DisplayRotation, Rect, Size};
pub use hardware::{CameraBackend, CameraHandle, DeviceCapabilities, DeviceInfo, DeviceParameters};
pub use session::{CameraDeviceSession, FramingGeometry};
pub use worker::DecodeWorker;

#[cfg(feature = "qr")]
pub use qr::RqrrDecoder;
