//! The shipped lint rules, one per file.

mod e110;
mod e111;
mod l001;
mod l002;
mod p001;
mod p002;

pub use e110::UndeclaredAlias;
pub use e111::SelectStar;
pub use l001::KeywordCase;
pub use l002::TrailingSemicolon;
pub use p001::PortableCast;
pub use p002::PortableIlike;

/// Base documentation URL for rule pages.
pub(crate) fn rule_url(id: &str) -> String {
    format!(
        "https://github.com/weft-data/weft/blob/main/docs/rules.md#{}",
        id.to_lowercase()
    )
}
