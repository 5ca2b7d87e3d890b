use crate::models::MarketMeta;

pub const GENERAL_PICKS: &str = "General Picks";

struct MarketPreset {
    aliases: &'static [&'static str],
    label: &'static str,
    meta: MarketMeta,
}

const MARKET_PRESETS: &[MarketPreset] = &[
    MarketPreset {
        aliases: &["spread", "against the spread", "ats", "point spread"],
        label: "Spread",
        meta: MarketMeta { icon: "📏", description: "Against the spread selections" },
    },
    MarketPreset {
        aliases: &["moneyline", "money line", "ml"],
        label: "Moneyline",
        meta: MarketMeta { icon: "💰", description: "Straight-up winners" },
    },
    MarketPreset {
        aliases: &["total", "over/under", "o/u", "ou", "over under"],
        label: "Total",
        meta: MarketMeta { icon: "📊", description: "Game totals and tempo reads" },
    },
    MarketPreset {
        aliases: &["player prop", "props", "prop"],
        label: "Player Prop",
        meta: MarketMeta { icon: "🎯", description: "Individual player markets" },
    },
    MarketPreset {
        aliases: &["team total"],
        label: "Team Total",
        meta: MarketMeta { icon: "🏟️", description: "Team scoring outlooks" },
    },
];

const GENERAL_META: MarketMeta = MarketMeta {
    icon: "🧠",
    description: "Mixed markets or unspecified angles",
};

const CUSTOM_META: MarketMeta = MarketMeta { icon: "📌", description: "" };

/// Map a free-text market label onto its canonical name.
///
/// Blank or missing labels land in "General Picks"; labels that match no alias
/// are returned trimmed but otherwise untouched so user-defined markets survive.
pub fn format_market_label(input: Option<&str>) -> String {
    let raw = input.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return GENERAL_PICKS.to_string();
    }

    let lowered = raw.to_lowercase();
    MARKET_PRESETS
        .iter()
        .find(|preset| preset.aliases.contains(&lowered.as_str()))
        .map(|preset| preset.label.to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Icon and description for a market label. The label is canonicalized here,
/// so raw user text and already-formatted labels give the same answer.
pub fn market_meta(label: Option<&str>) -> MarketMeta {
    let blank = label.map_or(true, |l| l.is_empty());
    let canonical = format_market_label(label);
    if blank || canonical == GENERAL_PICKS {
        return GENERAL_META;
    }

    MARKET_PRESETS
        .iter()
        .find(|preset| preset.label == canonical)
        .map(|preset| preset.meta)
        .unwrap_or(CUSTOM_META)
}
