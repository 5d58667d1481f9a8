//! Keyword hints for classes with no direct mapping.
//!
//! Only consulted when keyword fallback is enabled on the store. Groups are
//! checked in order, so a class matching both a recyclable and a compostable
//! keyword resolves as recyclable.

use super::verdict::Recyclability;

const RECYCLABLE_KEYWORDS: &[&str] = &[
    "bottle",
    "can",
    "jar",
    "glass",
    "metal",
    "aluminum",
    "steel",
    "paper",
    "cardboard",
    "book",
    "magazine",
    "newspaper",
    "plastic",
    "container",
    "electronic",
    "computer",
    "phone",
    "laptop",
    "tv",
    "monitor",
    "keyboard",
    "mouse",
    "cable",
    "wire",
    "battery",
    "camera",
    "radio",
    "speaker",
];

const COMPOSTABLE_KEYWORDS: &[&str] = &[
    "food",
    "fruit",
    "vegetable",
    "plant",
    "flower",
    "leaf",
    "organic",
    "apple",
    "banana",
    "orange",
    "bread",
    "meat",
    "fish",
    "egg",
    "cheese",
    "pizza",
    "sandwich",
];

const NON_RECYCLABLE_KEYWORDS: &[&str] = &[
    "clothing",
    "fabric",
    "leather",
    "rubber",
    "ceramic",
    "styrofoam",
    "foam",
    "tissue",
    "napkin",
    "diaper",
    "cigarette",
    "gum",
    "mirror",
    "lightbulb",
];

/// Guess a verdict from substrings of an already-normalized class name.
pub fn guess(normalized_class: &str) -> Option<Recyclability> {
    let groups = [
        (RECYCLABLE_KEYWORDS, Recyclability::Recyclable),
        (COMPOSTABLE_KEYWORDS, Recyclability::Compostable),
        (NON_RECYCLABLE_KEYWORDS, Recyclability::NonRecyclable),
    ];
    groups.into_iter().find_map(|(keywords, verdict)| {
        keywords
            .iter()
            .any(|keyword| normalized_class.contains(keyword))
            .then_some(verdict)
    })
}
