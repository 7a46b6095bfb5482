/// 1-based line and column of a byte offset in `source`. Columns count
/// characters, not bytes. Only called on the error path.
pub fn get_line_and_column(source: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (offset, c) in source.char_indices() {
        if offset >= position {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_bytes() {
        assert_eq!(get_line_and_column("ab\ncd", 4), (2, 2));
        assert_eq!(get_line_and_column("é = ]", 5), (1, 5));
        assert_eq!(get_line_and_column("x", 10), (1, 2));
    }
}
