//! Garment sizes, size-chart lookups and size matching.

use serde::{Deserialize, Serialize};

/// Garment size, ordered smallest to largest. `FreeSize` sorts last.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Size {
    XS,
    S,
    M,
    L,
    XL,
    XXL,
    XXXL,
    #[serde(rename = "FREE")]
    FreeSize,
}

impl Size {
    pub const ALL: [Size; 8] = [
        Size::XS,
        Size::S,
        Size::M,
        Size::L,
        Size::XL,
        Size::XXL,
        Size::XXXL,
        Size::FreeSize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Size::XS => "XS",
            Size::S => "S",
            Size::M => "M",
            Size::L => "L",
            Size::XL => "XL",
            Size::XXL => "XXL",
            Size::XXXL => "XXXL",
            Size::FreeSize => "FREE",
        }
    }

    /// Parse a size label, accepting common aliases.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "xs" | "extra small" | "x small" => Some(Size::XS),
            "s" | "small" => Some(Size::S),
            "m" | "medium" | "med" => Some(Size::M),
            "l" | "large" => Some(Size::L),
            "xl" | "extra large" | "x large" => Some(Size::XL),
            "xxl" | "2xl" | "2x" => Some(Size::XXL),
            "xxxl" | "3xl" | "3x" => Some(Size::XXXL),
            "free" | "free size" | "freesize" | "one size" | "onesize" | "os" => {
                Some(Size::FreeSize)
            }
            _ => None,
        }
    }

    /// Upper chest measurement in inches for this size on the store's chart.
    pub fn chest_inches(&self) -> Option<u32> {
        match self {
            Size::XS => Some(34),
            Size::S => Some(36),
            Size::M => Some(38),
            Size::L => Some(40),
            Size::XL => Some(42),
            Size::XXL => Some(44),
            Size::XXXL => Some(46),
            Size::FreeSize => None,
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stock on hand for one size of a product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SizeStock {
    pub size: Size,
    pub stock: i64,
}

/// Resolve a requested size label against a product's stocked sizes.
///
/// A product that only comes in `FreeSize` matches any requested size.
pub fn match_size<'a>(requested: &str, available: &'a [SizeStock]) -> Option<&'a SizeStock> {
    let only_free = !available.is_empty() && available.iter().all(|s| s.size == Size::FreeSize);
    if only_free {
        return available.first();
    }

    let size = Size::parse(requested)?;
    available.iter().find(|s| s.size == size)
}

/// Recommend the smallest in-stock size that fits the given chest measurement.
pub fn recommend_size(chest_inches: f64, available: &[SizeStock]) -> Option<Size> {
    if !chest_inches.is_finite() || chest_inches <= 0.0 {
        return None;
    }

    let mut charted: Vec<(Size, u32)> = available
        .iter()
        .filter(|s| s.stock > 0)
        .filter_map(|s| s.size.chest_inches().map(|c| (s.size, c)))
        .collect();
    charted.sort();

    charted
        .into_iter()
        .find(|(_, bound)| f64::from(*bound) >= chest_inches)
        .map(|(size, _)| size)
        .or_else(|| {
            available
                .iter()
                .find(|s| s.size == Size::FreeSize && s.stock > 0)
                .map(|s| s.size)
        })
}

/// Parse raw `(label, stock)` pairs into canonical sizes.
///
/// Duplicate sizes are merged by summing stock. Labels that do not parse are
/// returned separately. Output is sorted by size.
pub fn normalize_size_labels<S: AsRef<str>>(labels: &[(S, i64)]) -> (Vec<SizeStock>, Vec<String>) {
    let mut merged: Vec<SizeStock> = Vec::new();
    let mut rejected = Vec::new();

    for (label, stock) in labels {
        match Size::parse(label.as_ref()) {
            Some(size) => match merged.iter_mut().find(|s| s.size == size) {
                Some(existing) => existing.stock += (*stock).max(0),
                None => merged.push(SizeStock {
                    size,
                    stock: (*stock).max(0),
                }),
            },
            None => rejected.push(label.as_ref().to_string()),
        }
    }

    merged.sort_by_key(|s| s.size);
    (merged, rejected)
}
