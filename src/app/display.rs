/// Wrap `value` in an ANSI SGR sequence when `enabled`.
pub fn colorize(value: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{code}m{value}\u{1b}[0m")
    } else {
        value.to_string()
    }
}
