use super::verdict::Recyclability::{self, *};

/// Built-in mapping loaded into every new store.
///
/// Keys are already normalized. Food items are compostable rather than
/// recyclable; batteries and other items that need a drop-off point are
/// `SpecialHandling`.
pub const DEFAULT_MAPPINGS: &[(&str, Recyclability)] = &[
    ("bottle", Recyclable),
    ("wine glass", Recyclable),
    ("cup", Recyclable),
    ("fork", Recyclable),
    ("knife", Recyclable),
    ("spoon", Recyclable),
    ("bowl", Recyclable),
    ("tv", Recyclable),
    ("laptop", Recyclable),
    ("mouse", Recyclable),
    ("keyboard", Recyclable),
    ("cell phone", Recyclable),
    ("microwave", Recyclable),
    ("oven", Recyclable),
    ("toaster", Recyclable),
    ("refrigerator", Recyclable),
    ("book", Recyclable),
    ("vase", Recyclable),
    ("scissors", Recyclable),
    ("clock", Recyclable),
    ("can", Recyclable),
    ("jar", Recyclable),
    ("container", Recyclable),
    ("cardboard", Recyclable),
    ("paper", Recyclable),
    ("newspaper", Recyclable),
    ("magazine", Recyclable),
    ("aluminum", Recyclable),
    ("metal", Recyclable),
    ("glass", Recyclable),
    ("plastic", Recyclable),
    ("electronics", Recyclable),
    ("wire", Recyclable),
    ("cable", Recyclable),
    ("computer", Recyclable),
    ("monitor", Recyclable),
    ("phone", Recyclable),
    ("tablet", Recyclable),
    ("camera", Recyclable),
    ("radio", Recyclable),
    ("speaker", Recyclable),
    ("headphones", Recyclable),
    ("charger", Recyclable),
    ("remote", Recyclable),
    ("banana", Compostable),
    ("apple", Compostable),
    ("sandwich", Compostable),
    ("orange", Compostable),
    ("broccoli", Compostable),
    ("carrot", Compostable),
    ("hot dog", Compostable),
    ("pizza", Compostable),
    ("donut", Compostable),
    ("cake", Compostable),
    ("potted plant", Compostable),
    ("food", Compostable),
    ("fruit", Compostable),
    ("vegetable", Compostable),
    ("bread", Compostable),
    ("meat", Compostable),
    ("fish", Compostable),
    ("egg", Compostable),
    ("cheese", Compostable),
    ("lettuce", Compostable),
    ("tomato", Compostable),
    ("potato", Compostable),
    ("onion", Compostable),
    ("garlic", Compostable),
    ("leaf", Compostable),
    ("flower", Compostable),
    ("plant", Compostable),
    ("teddy bear", NonRecyclable),
    ("backpack", NonRecyclable),
    ("umbrella", NonRecyclable),
    ("handbag", NonRecyclable),
    ("tie", NonRecyclable),
    ("suitcase", NonRecyclable),
    ("sports ball", NonRecyclable),
    ("frisbee", NonRecyclable),
    ("kite", NonRecyclable),
    ("chair", NonRecyclable),
    ("couch", NonRecyclable),
    ("bed", NonRecyclable),
    ("dining table", NonRecyclable),
    ("toilet", NonRecyclable),
    ("sink", NonRecyclable),
    ("toothbrush", NonRecyclable),
    ("hair drier", NonRecyclable),
    ("clothing", NonRecyclable),
    ("shoes", NonRecyclable),
    // Most curbside programs refuse film plastics.
    ("plastic bag", NonRecyclable),
    ("styrofoam", NonRecyclable),
    ("ceramic", NonRecyclable),
    ("mirror", NonRecyclable),
    ("lightbulb", NonRecyclable),
    ("napkin", NonRecyclable),
    ("tissue", NonRecyclable),
    ("diaper", NonRecyclable),
    ("cigarette", NonRecyclable),
    ("gum", NonRecyclable),
    ("battery", SpecialHandling),
    ("paint can", SpecialHandling),
    ("aerosol", SpecialHandling),
    ("chemical", SpecialHandling),
    ("motor oil", SpecialHandling),
    ("tire", SpecialHandling),
    ("mattress", SpecialHandling),
];
