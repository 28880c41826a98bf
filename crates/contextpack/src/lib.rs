//! History shaping for the completion API: structural repair
//! ([`sanitize`]) and size limits ([`governor`]).

pub mod governor;
pub mod sanitize;

pub use governor::{
    evict_oldest, govern, split_outbound, strip_stale_media, truncate_block_text, GovernReport,
    GovernorLimits,
};
pub use sanitize::{is_well_formed, sanitize, sanitize_with_report, SanitizeReport};
