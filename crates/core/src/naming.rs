//! Project naming: a type-code prefix followed by a zero-padded serial.

/// Width of the numeric part of a project name.
const SERIAL_WIDTH: usize = 3;

/// Name for a project of `type_code` created from request `serial`.
pub fn project_name(type_code: &str, serial: i64) -> String {
    format!("{type_code}{serial:0width$}", width = SERIAL_WIDTH)
}

/// Rename a project whose type changes from `old_type` to `new_type`.
///
/// Only the type prefix is replaced. Names that do not carry the old prefix
/// get the new one prepended.
pub fn retype_name(name: &str, old_type: &str, new_type: &str) -> String {
    match name.strip_prefix(old_type) {
        Some(rest) => format!("{new_type}{rest}"),
        None => format!("{new_type}{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_is_zero_padded() {
        assert_eq!(project_name("A", 7), "A007");
        assert_eq!(project_name("prep", 1234), "prep1234");
    }

    #[test]
    fn retype_swaps_prefix() {
        assert_eq!(retype_name("A007", "A", "B"), "B007");
        assert_eq!(retype_name("x12", "A", "B"), "Bx12");
    }
}
