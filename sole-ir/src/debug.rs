#![forbid(unsafe_code)]

use sole_ast::Span;

/// Maps byte offsets back to human positions when rendering checked IR.
#[derive(Clone, Debug)]
pub struct SourceMap {
    pub file_name: String,
    line_starts: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineCol {
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub col: u32,
}

impl SourceMap {
    pub fn new(file_name: impl Into<String>, text: &str) -> Self {
        let mut line_starts = vec![0usize];
        let mut offset = 0usize;
        for line in text.split_inclusive('\n') {
            offset += line.len();
            line_starts.push(offset);
        }
        Self {
            file_name: file_name.into(),
            line_starts,
        }
    }

    pub fn line_col(&self, span: Span) -> LineCol {
        let off: usize = span.offset().into();

        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= off)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx];

        LineCol {
            line: (line_idx as u32) + 1,
            col: (off - line_start) as u32 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sole_ast::span;

    #[test]
    fn first_line_positions() {
        let map = SourceMap::new("main.sole", "let db = psql.open(url)\n");
        assert_eq!(map.line_col(span(0, 3)), LineCol { line: 1, col: 1 });
        assert_eq!(map.line_col(span(4, 2)), LineCol { line: 1, col: 5 });
    }

    #[test]
    fn later_lines_and_eof() {
        let text = "let a = 1\nlet b = 2\nb\n";
        let map = SourceMap::new("main.sole", text);
        assert_eq!(map.line_col(span(10, 3)), LineCol { line: 2, col: 1 });
        assert_eq!(map.line_col(span(20, 1)), LineCol { line: 3, col: 1 });
        assert_eq!(
            map.line_col(span(text.len(), 0)),
            LineCol { line: 4, col: 1 }
        );
    }
}
