pub mod pr_bubble;

pub use pr_bubble::{
    ActivePrBubble, ListQuery, ListSort, NewPrBubble, PrBubble, PrBubblePatch, PrBubbleRow, PrPage,
    PrStats, PrStatus, TagType, TrackEvent,
};
