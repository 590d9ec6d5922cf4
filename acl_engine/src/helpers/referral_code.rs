use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;

use crate::db_types::ReferralCode;

/// Characters used when issuing new codes. Ambiguous glyphs (0/O, 1/I) are excluded so codes
/// survive being read aloud or retyped from print.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]+(?:-[A-Z0-9]+)*$").unwrap())
}

/// Referral codes are uppercase alphanumerics in dash-separated groups, 4 to 32 characters,
/// e.g. `AFF-AB12CD-E3F`.
pub fn is_valid_referral_code(code: &str) -> bool {
    (4..=32).contains(&code.len()) && code_pattern().is_match(code)
}

/// Issues a new referral code in the `AFF-XXXXXX-XXX` form. Uniqueness is enforced by the ledger's
/// unique index; callers retry on collision.
pub fn generate_referral_code<R: Rng>(rng: &mut R) -> ReferralCode {
    let mut pick = |n: usize| {
        (0..n).map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char).collect::<String>()
    };
    let body = pick(6);
    let suffix = pick(3);
    ReferralCode(format!("AFF-{body}-{suffix}"))
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn generated_codes_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let code = generate_referral_code(&mut rng);
            assert!(is_valid_referral_code(code.as_str()), "generated invalid code {code}");
        }
    }

    #[test]
    fn validation_rejects_junk() {
        assert!(is_valid_referral_code("AFF-AB12CD-E3F"));
        assert!(is_valid_referral_code("PROMO2024"));
        assert!(!is_valid_referral_code("aff-lowercase"));
        assert!(!is_valid_referral_code("AB"));
        assert!(!is_valid_referral_code("TRAILING-"));
        assert!(!is_valid_referral_code("SP ACE"));
        assert!(!is_valid_referral_code(""));
    }

    #[test]
    fn referral_code_from_str_uses_validation() {
        assert!(ReferralCode::from_str("AFF-AB12CD-E3F").is_ok());
        assert!(ReferralCode::from_str("nope nope").is_err());
    }
}
