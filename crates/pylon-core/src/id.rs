//! Default identifier generation.

use uuid::Uuid;

/// Default length of generated identifiers.
pub const DEFAULT_ID_SIZE: usize = 32;

/// Generates a random lowercase hex identifier of exactly `size` characters.
///
/// # Example
///
/// ```
/// use pylon_core::generate_id;
///
/// let id = generate_id(16);
/// assert_eq!(id.len(), 16);
/// assert_ne!(id, generate_id(16));
/// ```
#[must_use]
pub fn generate_id(size: usize) -> String {
    let mut id = String::with_capacity(size + DEFAULT_ID_SIZE);
    while id.len() < size {
        id.push_str(&Uuid::new_v4().simple().to_string());
    }
    id.truncate(size);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size() {
        let id = generate_id(DEFAULT_ID_SIZE);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sizes_beyond_one_uuid() {
        assert_eq!(generate_id(0), "");
        assert_eq!(generate_id(5).len(), 5);
        assert_eq!(generate_id(70).len(), 70);
    }
}
