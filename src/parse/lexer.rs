pub type Lexer<'a> = logos_iter::PeekableLexer<'a, logos::Lexer<'a, TokenKind>, TokenKind>;

pub fn lexer(s: &str) -> Lexer {
    logos_iter::LogosIter::peekable_lexer(<TokenKind as logos::Logos>::lexer(s))
}

/// Token set of the dice notation.
///
/// Modifier letters are matched case-insensitively; `D66` is case-sensitive
/// so that the composed die stays distinct from a 66-sided polyhedral
/// (`d66`). Longest match wins, which is what disambiguates `-h` from binary
/// `-`, `!!o` from `!!`, and `kh` from `k`.
#[derive(logos::Logos, Debug, Copy, Clone, Eq, PartialEq)]
pub enum TokenKind {
    #[regex(r"[0-9]+")]
    Integer,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,

    #[token("+")]
    Plus,
    #[token("*")]
    Star,
    #[token("-")]
    Minus,

    #[regex(r"-[hH]")]
    DropHigh,
    #[regex(r"-[lL]")]
    DropLow,
    #[token("-<=")]
    DropLessEqual,
    #[token("-<")]
    DropLess,
    #[token("->=")]
    DropGreaterEqual,
    #[token("->")]
    DropGreater,
    #[token("-=")]
    DropEqual,

    #[regex(r"[kK][hH]")]
    KeepHigh,
    #[regex(r"[kK][lL]")]
    KeepLow,
    #[regex(r"[kK]")]
    Keep,

    #[regex(r"[cC]>")]
    ClampMax,
    #[regex(r"[cC]<")]
    ClampMin,

    #[regex(r"[sS][dD]")]
    SortDesc,
    #[regex(r"[sS]")]
    SortAsc,

    #[regex(r"[rR][oO]")]
    RerollOnce,
    #[regex(r"[rR]")]
    Reroll,

    #[regex(r"!![oO]")]
    CompoundOnce,
    #[token("!!")]
    Compound,
    #[regex(r"![oO]")]
    ExplodeOnce,
    #[token("!")]
    Explode,
    #[regex(r"[pP]")]
    Penetrate,

    #[regex(r"#[cC][sS]")]
    CountCritSuccess,
    #[regex(r"#[cC][fF]")]
    CountCritFailure,
    #[regex(r"#[sS]")]
    CountSuccess,
    #[regex(r"#[fF]")]
    CountFailure,
    #[token("#")]
    Count,

    #[token(">=")]
    GreaterEqual,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    GreaterThan,
    #[token("<")]
    LessThan,
    #[token("=")]
    Equal,

    #[token("D66")]
    D66,
    #[regex(r"[dD]")]
    Die,
    #[token("F")]
    Fudge,
    #[token("%")]
    Percent,

    #[regex(r"[ \t\r\n]+", logos::skip)]
    #[error]
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn lex(s: &str) -> Vec<TokenKind> {
        lexer(s).collect()
    }

    #[test]
    fn test_lex_dice() {
        assert_eq!(lex("4d20"), vec![Integer, Die, Integer]);
        assert_eq!(lex("d6"), vec![Die, Integer]);
        assert_eq!(lex("2dF"), vec![Integer, Die, Fudge]);
        assert_eq!(lex("d%"), vec![Die, Percent]);
        assert_eq!(lex("3d[1,2,3]"), vec![
            Integer,
            Die,
            LeftBracket,
            Integer,
            Comma,
            Integer,
            Comma,
            Integer,
            RightBracket,
        ]);
    }

    #[test]
    fn test_lex_d66_case_sensitivity() {
        assert_eq!(lex("D66"), vec![D66]);
        assert_eq!(lex("d66"), vec![Die, Integer]);
        assert_eq!(lex("2D66"), vec![Integer, D66]);
    }

    #[test]
    fn test_lex_minus_disambiguation() {
        assert_eq!(lex("4d6-2"), vec![Integer, Die, Integer, Minus, Integer]);
        assert_eq!(lex("4d6-h2"), vec![Integer, Die, Integer, DropHigh, Integer]);
        assert_eq!(lex("4d6-H"), vec![Integer, Die, Integer, DropHigh]);
        assert_eq!(lex("4d6-<=2"), vec![Integer, Die, Integer, DropLessEqual, Integer]);
        assert_eq!(lex("4d6-="), vec![Integer, Die, Integer, DropEqual]);
    }

    #[test]
    fn test_lex_explode_family() {
        assert_eq!(lex("9d6!"), vec![Integer, Die, Integer, Explode]);
        assert_eq!(lex("9d6!o"), vec![Integer, Die, Integer, ExplodeOnce]);
        assert_eq!(lex("9d6!!"), vec![Integer, Die, Integer, Compound]);
        assert_eq!(lex("9d6!!o"), vec![Integer, Die, Integer, CompoundOnce]);
        assert_eq!(lex("9d6p4"), vec![Integer, Die, Integer, Penetrate, Integer]);
    }

    #[test]
    fn test_lex_counts_and_keeps() {
        assert_eq!(
            lex("4d20 kh2 #cs #cf"),
            vec![Integer, Die, Integer, KeepHigh, Integer, CountCritSuccess, CountCritFailure]
        );
        assert_eq!(lex("#s<=3"), vec![CountSuccess, LessEqual, Integer]);
        assert_eq!(lex("KH"), vec![KeepHigh]);
        assert_eq!(lex("k"), vec![Keep]);
        assert_eq!(lex("C>5c<2"), vec![ClampMax, Integer, ClampMin, Integer]);
        assert_eq!(lex("sd"), vec![SortDesc]);
        assert_eq!(lex("ro<3"), vec![RerollOnce, LessThan, Integer]);
    }

    #[test]
    fn test_lex_unknown_token() {
        assert_eq!(lex("4x6"), vec![Integer, Error, Integer]);
    }
}
