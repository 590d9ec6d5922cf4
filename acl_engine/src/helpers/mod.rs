mod diff;
mod referral_code;

pub use diff::field_diff;
pub use referral_code::{generate_referral_code, is_valid_referral_code};
