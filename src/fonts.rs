use std::num::NonZeroUsize;

use cosmic_text::{Attrs, Buffer, Family, FontSystem, Metrics, Shaping};
use lru::LruCache;

const CACHE_CAPACITY: usize = 512;

#[derive(Hash, PartialEq, Eq, Clone)]
struct MeasureKey {
    text: String,
    font_size_bits: u32,
}

/// Width and height of a single line of sans-serif text.
pub trait TextMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32) -> (f32, f32);
}

pub struct CosmicTextMeasure {
    font_system: FontSystem,
    cache: LruCache<MeasureKey, (f32, f32)>,
}

impl CosmicTextMeasure {
    pub fn new() -> Result<Self, String> {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).ok_or("text cache capacity must be non-zero")?;
        Ok(Self {
            font_system: FontSystem::new(),
            cache: LruCache::new(capacity),
        })
    }
}

impl TextMeasure for CosmicTextMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32) -> (f32, f32) {
        let key = MeasureKey {
            text: text.to_string(),
            font_size_bits: font_size.to_bits(),
        };

        if let Some(cached) = self.cache.get(&key) {
            return *cached;
        }

        let line_height = font_size * 1.2;
        let mut buffer = Buffer::new(
            &mut self.font_system,
            Metrics {
                font_size,
                line_height,
            },
        );
        buffer.set_size(&mut self.font_system, None, None);

        let attrs = Attrs::new().family(Family::SansSerif);
        buffer.set_text(&mut self.font_system, text, &attrs, Shaping::Advanced, None);

        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        for run in buffer.layout_runs() {
            width = width.max(run.line_w);
            height += run.line_height;
        }

        let measured = (width, height.max(line_height));
        self.cache.put(key, measured);
        measured
    }
}

/// Fixed per-character advance. Deterministic and font-free, for tests and headless runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvanceMeasure {
    pub advance: f32,
}

impl Default for FixedAdvanceMeasure {
    fn default() -> Self {
        Self { advance: 0.55 }
    }
}

impl TextMeasure for FixedAdvanceMeasure {
    fn measure_text(&mut self, text: &str, font_size: f32) -> (f32, f32) {
        (
            text.chars().count() as f32 * font_size * self.advance,
            font_size * 1.2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_advance_scales_with_length_and_size() {
        let mut m = FixedAdvanceMeasure::default();
        let (w1, h1) = m.measure_text("Beaver (1985)", 10.0);
        let (w2, _) = m.measure_text("Beaver (1985)", 20.0);
        assert!((w2 - 2.0 * w1).abs() < 1e-4);
        assert!((h1 - 12.0).abs() < 1e-4);
        assert_eq!(m.measure_text("", 10.0).0, 0.0);
    }
}
