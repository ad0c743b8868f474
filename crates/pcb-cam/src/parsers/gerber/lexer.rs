/// Tokens produced by the Gerber lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum GerberToken {
    /// Extended command block (contents between `%` delimiters).
    /// Example: `"FSLAX24Y24"`, `"ADD10C,0.020"`, `"LPD"`
    Extended(String),
    /// A word command terminated by `*`.
    /// Example: `"D10"`, `"X100Y200D01"`, `"G01"`, `"M02"`
    Word(String),
}

/// A token together with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub line: usize,
    pub token: GerberToken,
}

/// Tokenize a Gerber file into a sequence of tokens.
///
/// Gerber uses `*` as a statement terminator and `%...*%` for extended commands.
/// Comments start with `G04` and end with `*`.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut line = 1;

    while let Some(&ch) = chars.peek() {
        match ch {
            '%' => {
                chars.next();
                let mut block = String::new();
                let mut start = line;
                loop {
                    match chars.next() {
                        Some('%') => {
                            push_token(&mut tokens, start, &block, GerberToken::Extended);
                            break;
                        }
                        Some('*') => {
                            // End of one extended command within the block
                            push_token(&mut tokens, start, &block, GerberToken::Extended);
                            block.clear();
                            start = line;
                        }
                        Some('\n') => {
                            line += 1;
                            if block.trim().is_empty() {
                                start = line;
                            }
                        }
                        Some('\r') => {}
                        Some(c) => block.push(c),
                        None => {
                            // EOF inside extended block
                            push_token(&mut tokens, start, &block, GerberToken::Extended);
                            break;
                        }
                    }
                }
            }
            '\n' => {
                line += 1;
                chars.next();
            }
            '\r' | ' ' | '\t' => {
                chars.next();
            }
            _ => {
                let start = line;
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '*' {
                        chars.next();
                        break;
                    }
                    if c == '%' {
                        break; // let the outer loop handle it
                    }
                    chars.next();
                    match c {
                        '\n' => line += 1,
                        '\r' => {}
                        _ => word.push(c),
                    }
                }
                push_token(&mut tokens, start, &word, GerberToken::Word);
            }
        }
    }

    tokens
}

fn push_token(tokens: &mut Vec<Token>, line: usize, raw: &str, kind: fn(String) -> GerberToken) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && !is_comment(trimmed) {
        tokens.push(Token {
            line,
            token: kind(trimmed.to_string()),
        });
    }
}

/// Check if a command is a G04 comment.
fn is_comment(s: &str) -> bool {
    s.starts_with("G04") || (s.starts_with("G4") && !s[2..].starts_with(|c: char| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bodies(input: &str) -> Vec<GerberToken> {
        tokenize(input).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_simple_commands() {
        let input = "G01*\nD10*\nX100Y200D01*\nM02*\n";
        assert_eq!(
            bodies(input),
            vec![
                GerberToken::Word("G01".into()),
                GerberToken::Word("D10".into()),
                GerberToken::Word("X100Y200D01".into()),
                GerberToken::Word("M02".into()),
            ]
        );
    }

    #[test]
    fn test_extended_commands() {
        let input = "%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,0.020*%\n";
        assert_eq!(
            bodies(input),
            vec![
                GerberToken::Extended("FSLAX24Y24".into()),
                GerberToken::Extended("MOMM".into()),
                GerberToken::Extended("ADD10C,0.020".into()),
            ]
        );
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(
            bodies("G04 This is a comment*\nD10*\n"),
            vec![GerberToken::Word("D10".into())]
        );
        assert_eq!(
            bodies("%G04 Comment in extended block*%\n%MOMM*%\n"),
            vec![GerberToken::Extended("MOMM".into())]
        );
    }

    #[test]
    fn test_multiple_extended_in_one_block() {
        assert_eq!(
            bodies("%FSLAX24Y24*MOMM*%\n"),
            vec![
                GerberToken::Extended("FSLAX24Y24".into()),
                GerberToken::Extended("MOMM".into()),
            ]
        );
    }

    #[test]
    fn test_line_numbers() {
        let input = "%FSLAX24Y24*%\n%MOMM*%\nG04 comment*\n\nD10*\nX0Y0D03*\n";
        let tokens = tokenize(input);
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 5, 6]);
    }

    #[test]
    fn test_word_spanning_lines_keeps_start_line() {
        let tokens = tokenize("X100\nY200D01*\nM02*");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].token, GerberToken::Word("X100Y200D01".into()));
        assert_eq!(tokens[1].line, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  \n\r\t  ").is_empty());
    }

    #[test]
    fn test_x2_attributes() {
        assert_eq!(
            bodies("%TF.FileFunction,Copper,L1,Top*%\n%TF.FilePolarity,Positive*%\n"),
            vec![
                GerberToken::Extended("TF.FileFunction,Copper,L1,Top".into()),
                GerberToken::Extended("TF.FilePolarity,Positive".into()),
            ]
        );
    }
}
