//! QR decoder adapter over the rqrr crate.
//!
//! The pipeline only contracts with the [`Decoder`] trait; this adapter is
//! the stock implementation wired up by the demo binary. One symbol is
//! reported per attempt, matching the single-result decode loop.

use crate::decode::{DecodedSymbol, Decoder, SymbolFormat};
use crate::frame::LuminanceSource;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RqrrDecoder {
    fn decode(&mut self, source: &LuminanceSource) -> Option<DecodedSymbol> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            source.width() as usize,
            source.height() as usize,
            |x, y| source.luminance_at(x as u32, y as u32),
        );

        let grids = prepared.detect_grids();
        let grid = grids.first()?;

        match grid.decode() {
            Ok((meta, content)) => {
                let mut symbol = DecodedSymbol::new(content, SymbolFormat::QrCode);
                symbol.points = grid
                    .bounds
                    .iter()
                    .map(|p| (p.x as f32, p.y as f32))
                    .collect();
                symbol.metadata = vec![
                    ("version".to_string(), meta.version.0.to_string()),
                    ("ecc_level".to_string(), meta.ecc_level.to_string()),
                    ("mask".to_string(), meta.mask.to_string()),
                ];
                Some(symbol)
            }
            Err(e) => {
                debug!("QR grid detected but decode failed: {}", e);
                None
            }
        }
    }

    fn reset(&mut self) {
        // rqrr keeps no state across calls.
    }
}
