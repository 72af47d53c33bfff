//! Version comparison with BitBake semantics.
//!
//! A version is `[epoch:]version[-revision]`. Each part is compared piecewise:
//! runs of digits numerically, runs of letters lexically, `~` sorts before
//! everything (including the end of the string) and other punctuation after
//! letters.

use derive_more::Display;
use std::cmp::Ordering;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display("=")]
    Eq,
    #[display("!=")]
    Ne,
    #[display(">=")]
    Ge,
    #[display(">")]
    Gt,
}
impl CompareOp {
    /// Parse an operator; `==`, `<<` and `>>` are accepted as aliases.
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "<" | "<<" => Self::Lt,
            "<=" => Self::Le,
            "=" | "==" => Self::Eq,
            "!=" => Self::Ne,
            ">=" => Self::Ge,
            ">" | ">>" => Self::Gt,
            _ => return None,
        })
    }

    /// Whether `left op right` holds given `left.cmp(right)`.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Ge => ordering.is_ge(),
            Self::Gt => ordering.is_gt(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Tilde,
    Number(&'a str),
    Alpha(&'a str),
    Other(char),
}
impl Piece<'_> {
    fn rank(piece: Option<&Self>) -> i8 {
        match piece {
            Some(Self::Tilde) => -1,
            None | Some(Self::Number(_)) => 0,
            Some(Self::Alpha(_)) => 1,
            Some(Self::Other(_)) => 2,
        }
    }
}

fn explode(version: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = version;
    while let Some(first) = rest.chars().next() {
        let run = |pred: fn(char) -> bool| rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        let (piece, len) = if first.is_ascii_digit() {
            let len = run(|c| c.is_ascii_digit());
            (Piece::Number(&rest[..len]), len)
        } else if first.is_ascii_alphabetic() {
            let len = run(|c| c.is_ascii_alphabetic());
            (Piece::Alpha(&rest[..len]), len)
        } else if first == '~' {
            (Piece::Tilde, 1)
        } else {
            (Piece::Other(first), first.len_utf8())
        };
        pieces.push(piece);
        rest = &rest[len..];
    }
    pieces
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_part(a: &str, b: &str) -> Ordering {
    let (a, b) = (explode(a), explode(b));
    for i in 0..a.len().max(b.len()) {
        let (pa, pb) = (a.get(i), b.get(i));
        let ordering = Piece::rank(pa).cmp(&Piece::rank(pb)).then_with(|| match (pa, pb) {
            (None, _) => Ordering::Less,
            (_, None) => Ordering::Greater,
            (Some(Piece::Number(x)), Some(Piece::Number(y))) => compare_numbers(x, y),
            (Some(Piece::Alpha(x)), Some(Piece::Alpha(y))) => x.cmp(y),
            (Some(Piece::Other(x)), Some(Piece::Other(y))) => x.cmp(y),
            _ => Ordering::Equal,
        });
        if ordering.is_ne() {
            return ordering;
        }
    }
    Ordering::Equal
}

/// `(epoch, version, revision)`; surrounding comparison characters are ignored.
fn split_version(version: &str) -> (i64, &str, &str) {
    let version = version.trim_matches([' ', '<', '>', '=']);
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => (epoch.trim().parse::<i64>().unwrap_or(0), rest.split(':').next().unwrap_or(rest)),
        None => (0, version),
    };
    match rest.rsplit_once('-') {
        Some((version, revision)) => (epoch, version, revision),
        None => (epoch, rest, ""),
    }
}

/// Compare two version strings.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let (ea, va, ra) = split_version(a);
    let (eb, vb, rb) = split_version(b);
    ea.cmp(&eb).then_with(|| compare_part(va, vb)).then_with(|| compare_part(ra, rb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.0", "1.0", Ordering::Equal)]
    #[case("1.0", "1.1", Ordering::Less)]
    #[case("1.10", "1.9", Ordering::Greater)]
    #[case("1.0", "1.0.1", Ordering::Less)]
    #[case("1.0~rc1", "1.0", Ordering::Less)]
    #[case("1.0a", "1.0", Ordering::Greater)]
    #[case("1.0a", "1.0.1", Ordering::Less)]
    #[case("1:1.0", "2.0", Ordering::Greater)]
    #[case("1.0-r1", "1.0-r0", Ordering::Greater)]
    #[case("007", "7", Ordering::Equal)]
    #[case("12345678901234567890123", "12345678901234567890124", Ordering::Less)]
    #[case(">= 3", "3", Ordering::Equal)]
    #[case("", "0", Ordering::Less)]
    fn test_vercmp(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(vercmp(a, b), expected);
        assert_eq!(vercmp(b, a), expected.reverse());
    }

    #[rstest]
    #[case("<", Some(CompareOp::Lt))]
    #[case("<<", Some(CompareOp::Lt))]
    #[case("==", Some(CompareOp::Eq))]
    #[case(">>", Some(CompareOp::Gt))]
    #[case("=<", None)]
    #[case("=>", None)]
    #[case("~", None)]
    fn test_parse_operator(#[case] op: &str, #[case] expected: Option<CompareOp>) {
        assert_eq!(CompareOp::parse(op), expected);
    }

    #[rstest]
    #[case(CompareOp::Ge, "3", "2", true)]
    #[case(CompareOp::Ge, "3", "3", true)]
    #[case(CompareOp::Gt, "3", "3", false)]
    #[case(CompareOp::Lt, "1.9", "1.10", true)]
    #[case(CompareOp::Ne, "4", "4", false)]
    fn test_operator_holds(#[case] op: CompareOp, #[case] left: &str, #[case] right: &str, #[case] expected: bool) {
        assert_eq!(op.holds(vercmp(left, right)), expected);
    }
}
