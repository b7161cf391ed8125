use crate::frame::{LuminanceSource, Thumbnail};
use std::time::Duration;

/// Symbology of a decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolFormat {
    QrCode,
    DataMatrix,
    Aztec,
    Pdf417,
    Code128,
    Code39,
    Ean13,
    UpcA,
    Other(String),
}

impl SymbolFormat {
    pub fn name(&self) -> &str {
        match self {
            SymbolFormat::QrCode => "QR_CODE",
            SymbolFormat::DataMatrix => "DATA_MATRIX",
            SymbolFormat::Aztec => "AZTEC",
            SymbolFormat::Pdf417 => "PDF_417",
            SymbolFormat::Code128 => "CODE_128",
            SymbolFormat::Code39 => "CODE_39",
            SymbolFormat::Ean13 => "EAN_13",
            SymbolFormat::UpcA => "UPC_A",
            SymbolFormat::Other(name) => name,
        }
    }
}

/// One successfully decoded symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSymbol {
    pub text: String,
    pub format: SymbolFormat,
    /// Finder-pattern points in crop-relative pixel coordinates.
    pub points: Vec<(f32, f32)>,
    /// Decoder-specific key/value annotations (version, ECC level, ...).
    pub metadata: Vec<(String, String)>,
}

impl DecodedSymbol {
    pub fn new<S: Into<String>>(text: S, format: SymbolFormat) -> Self {
        Self {
            text: text.into(),
            format,
            points: Vec::new(),
            metadata: Vec::new(),
        }
    }
}

/// Symbol-decoding capability consumed by the decode worker.
///
/// Implementations may keep scratch state across a single `decode` call;
/// the worker calls `reset` after every attempt, success or failure, so no
/// state leaks between frames.
pub trait Decoder {
    /// Attempt to find and decode one symbol. `None` is the expected
    /// steady-state result while no symbol is in frame.
    fn decode(&mut self, source: &LuminanceSource) -> Option<DecodedSymbol>;

    /// Drop any internal scratch state.
    fn reset(&mut self);
}

/// Result of one decode attempt, reported to the preview controller.
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Success(Box<DecodeSuccess>),
    Failure { elapsed: Duration },
}

/// Payload of a successful decode attempt.
#[derive(Debug, Clone)]
pub struct DecodeSuccess {
    pub symbol: DecodedSymbol,
    /// Downscaled grayscale of the decoded region, for result display.
    pub thumbnail: Thumbnail,
    /// Thumbnail-to-crop scale, for mapping finder points.
    pub scale_factor: f32,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_format_names() {
        assert_eq!(SymbolFormat::QrCode.name(), "QR_CODE");
        assert_eq!(SymbolFormat::Other("MAXICODE".to_string()).name(), "MAXICODE");
    }

    #[test]
    fn test_decoded_symbol_constructor() {
        let symbol = DecodedSymbol::new("hello", SymbolFormat::QrCode);
        assert_eq!(symbol.text, "hello");
        assert!(symbol.points.is_empty());
        assert!(symbol.metadata.is_empty());
    }
}
