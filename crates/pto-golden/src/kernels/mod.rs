//! Built-in golden references.

pub mod bgemm;
pub mod paged_attention;

pub use bgemm::{Bgemm, BgemmParams};
pub use paged_attention::{PagedAttention, PagedAttentionParams};
