/// A single parsed line of gcode, borrowing from the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction<'a> {
    opcode: &'a str,
    params: Vec<(char, &'a str)>,
    comment: Option<&'a str>,
}

impl<'a> Instruction<'a> {
    /// Parse one line. Blank lines and lines holding only a comment yield
    /// `None`.
    ///
    /// Each parameter word is split into its first character (the key) and
    /// the rest (the value). A key given twice on the same line keeps the
    /// last value.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            return None;
        }

        let (code, comment) = match line.split_once(';') {
            Some((code, comment)) => (code, Some(comment.trim())),
            None => (line, None),
        };

        let mut words = code.split_whitespace();
        let opcode = words.next()?;

        let mut params: Vec<(char, &'a str)> = Vec::new();
        for word in words {
            let mut chars = word.chars();
            let Some(key) = chars.next() else {
                continue;
            };
            let value = chars.as_str();

            match params.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => params.push((key, value)),
            }
        }

        Some(Self {
            opcode,
            params,
            comment,
        })
    }

    /// The command, e.g. `G1` or `M620`.
    pub fn opcode(&self) -> &'a str {
        self.opcode
    }

    /// The raw value of parameter `key`, if present.
    pub fn param(&self, key: char) -> Option<&'a str> {
        self.params.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// The trailing comment, without the `;`.
    pub fn comment(&self) -> Option<&'a str> {
        self.comment
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_move() {
        let instruction = Instruction::parse("G1 X10.5 Y-3 E0.42 F1800").unwrap();

        assert_eq!(instruction.opcode(), "G1");
        assert_eq!(instruction.param('X'), Some("10.5"));
        assert_eq!(instruction.param('Y'), Some("-3"));
        assert_eq!(instruction.param('E'), Some("0.42"));
        assert_eq!(instruction.param('Z'), None);
        assert_eq!(instruction.comment(), None);
    }

    #[test]
    fn test_parse_inline_comment() {
        let instruction = Instruction::parse("  M620 S2A ; load filament 2  ").unwrap();

        assert_eq!(instruction.opcode(), "M620");
        assert_eq!(instruction.param('S'), Some("2A"));
        assert_eq!(instruction.comment(), Some("load filament 2"));
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        assert_eq!(Instruction::parse(""), None);
        assert_eq!(Instruction::parse("   \t"), None);
        assert_eq!(Instruction::parse("; CHANGE_LAYER"), None);
        assert_eq!(Instruction::parse("   ;Z:0.4"), None);
    }

    #[test]
    fn test_parse_flag_without_value() {
        let instruction = Instruction::parse("M620 M").unwrap();

        assert_eq!(instruction.param('M'), Some(""));
        assert_eq!(instruction.param('S'), None);
    }

    #[test]
    fn test_parse_repeated_key_keeps_last() {
        let instruction = Instruction::parse("G1 E1 E2").unwrap();

        assert_eq!(instruction.param('E'), Some("2"));
    }
}
