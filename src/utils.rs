/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn groups_of_three() {
        assert_eq!(group_digits(1234567), "1,234,567");
        assert_eq!(group_digits(64), "64");
    }
}
