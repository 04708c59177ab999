use rand::Rng;
use uuid::Uuid;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `U-` followed by a letter and four letters or digits, e.g. `U-AB12C`.
pub fn generate_exchange_code(rng: &mut impl Rng) -> String {
    let mut code = String::with_capacity(7);
    code.push_str("U-");
    code.push(LETTERS[rng.random_range(0..LETTERS.len())] as char);
    for _ in 0..4 {
        code.push(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char);
    }
    code
}

/// Codes are shared by hand, so accept stray whitespace and lowercase.
pub fn normalize_exchange_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn new_pairing_id() -> String {
    format!("C-{}", Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_the_shareable_shape() {
        let mut rng = rand::rng();
        for _ in 0..200 {
            let code = generate_exchange_code(&mut rng);
            let bytes = code.as_bytes();
            assert_eq!(code.len(), 7, "{code}");
            assert!(code.starts_with("U-"));
            assert!(bytes[2].is_ascii_uppercase());
            assert!(bytes[3..].iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_exchange_code("  u-ab12c\n"), "U-AB12C");
    }

    #[test]
    fn pairing_ids_are_distinct() {
        assert_ne!(new_pairing_id(), new_pairing_id());
    }
}
