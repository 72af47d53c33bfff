//! Line-level reader for BitBake metadata files.
//!
//! Only the statements that influence variable values are kept. Function
//! bodies, task declarations and variable flags are recognised and dropped.

use crate::consts::{
    ASSIGNMENT_REGEX, DIRECTIVE_REGEX, EXPORT_REGEX, FUNCTION_START_REGEX, INCLUDE_REGEX, INHERIT_REGEX,
    PYTHON_DEF_REGEX, UNSET_REGEX,
};
use crate::error::{ErrorKind, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    /// `=`
    Set,
    /// `?=`
    Default,
    /// `??=`
    WeakDefault,
    /// `:=`
    Immediate,
    /// `+=`
    Append,
    /// `=+`
    Prepend,
    /// `.=`
    AppendNoSpace,
    /// `=.`
    PrependNoSpace,
}
impl AssignOp {
    fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            "=" => Self::Set,
            "?=" => Self::Default,
            "??=" => Self::WeakDefault,
            ":=" => Self::Immediate,
            "+=" => Self::Append,
            "=+" => Self::Prepend,
            ".=" => Self::AppendNoSpace,
            "=." => Self::PrependNoSpace,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Statement {
    Assign { var: String, op: AssignOp, value: String },
    Unset(String),
    /// Unexpanded, whitespace-separated class names.
    Inherit(String),
    Include { path: String, required: bool },
}

enum Block {
    None,
    /// Inside `name() { ... }`, terminated by a lone `}`.
    Function,
    /// Inside `def name(...):`, terminated by the first unindented line.
    PythonDef,
}

/// Split a metadata file into statements.
pub(crate) fn parse(file: &Path, content: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut block = Block::None;
    let mut pending = String::new();
    let mut start = 0;
    for (index, raw) in content.lines().enumerate() {
        match block {
            Block::Function => {
                if raw.trim_end() == "}" {
                    block = Block::None;
                }
                continue;
            },
            Block::PythonDef => {
                if raw.trim().is_empty() || raw.starts_with(char::is_whitespace) {
                    continue;
                }
                block = Block::None;
            },
            Block::None => {},
        }
        if pending.is_empty() {
            start = index + 1;
        }
        if let Some(continued) = raw.strip_suffix('\\') {
            pending.push_str(continued);
            continue;
        }
        pending.push_str(raw);
        let logical = std::mem::take(&mut pending);
        let line = logical.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if FUNCTION_START_REGEX.is_match(line) {
            block = Block::Function;
            continue;
        }
        if PYTHON_DEF_REGEX.is_match(line) {
            block = Block::PythonDef;
            continue;
        }
        match parse_line(line) {
            Some(Ok(statement)) => statements.push(statement),
            Some(Err(())) => exn::bail!(ErrorKind::Syntax {
                file: file.to_path_buf(),
                line: start,
                statement: line.to_string(),
            }),
            None => {},
        }
    }
    Ok(statements)
}

/// `None` for lines that are valid but carry no value information.
fn parse_line(line: &str) -> Option<std::result::Result<Statement, ()>> {
    if DIRECTIVE_REGEX.is_match(line) || EXPORT_REGEX.is_match(line) {
        return None;
    }
    if let Some(caps) = UNSET_REGEX.captures(line) {
        return Some(Ok(Statement::Unset(caps["var"].to_string())));
    }
    if let Some(caps) = INHERIT_REGEX.captures(line) {
        return Some(Ok(Statement::Inherit(caps["classes"].trim().to_string())));
    }
    if let Some(caps) = INCLUDE_REGEX.captures(line) {
        return Some(Ok(Statement::Include {
            path: caps["path"].trim().to_string(),
            required: &caps["kind"] == "require",
        }));
    }
    let caps = match ASSIGNMENT_REGEX.captures(line) {
        Some(caps) => caps,
        None => return Some(Err(())),
    };
    // Variable flags (`do_fetch[depends] += "..."`) never affect values.
    if caps.name("flag").is_some() {
        return None;
    }
    let op = AssignOp::from_operator(&caps["op"])?;
    let value = caps.name("dq").or_else(|| caps.name("sq")).map(|m| m.as_str()).unwrap_or_default();
    Some(Ok(Statement::Assign {
        var: caps["var"].to_string(),
        op,
        value: value.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse_str(content: &str) -> Vec<Statement> {
        parse(Path::new("test.bb"), content).unwrap()
    }

    fn assign(var: &str, op: AssignOp, value: &str) -> Statement {
        Statement::Assign { var: var.to_string(), op, value: value.to_string() }
    }

    #[rstest]
    #[case(r#"FOO = "bar""#, assign("FOO", AssignOp::Set, "bar"))]
    #[case(r#"FOO ?= "bar""#, assign("FOO", AssignOp::Default, "bar"))]
    #[case(r#"FOO ??= 'bar'"#, assign("FOO", AssignOp::WeakDefault, "bar"))]
    #[case(r#"FOO := "${BAR}""#, assign("FOO", AssignOp::Immediate, "${BAR}"))]
    #[case(r#"FOO += "bar""#, assign("FOO", AssignOp::Append, "bar"))]
    #[case(r#"FOO =+ "bar""#, assign("FOO", AssignOp::Prepend, "bar"))]
    #[case(r#"FOO .= "bar""#, assign("FOO", AssignOp::AppendNoSpace, "bar"))]
    #[case(r#"FOO =. "bar""#, assign("FOO", AssignOp::PrependNoSpace, "bar"))]
    #[case(r#"export FOO = "bar""#, assign("FOO", AssignOp::Set, "bar"))]
    #[case(r#"RDEPENDS:${PN}-dev:append = " baz""#, assign("RDEPENDS:${PN}-dev:append", AssignOp::Set, " baz"))]
    #[case(r#"SUMMARY="say \"hi\"""#, assign("SUMMARY", AssignOp::Set, r#"say \"hi\""#))]
    #[case("inherit autotools pkgconfig", Statement::Inherit("autotools pkgconfig".to_string()))]
    #[case("inherit_defer native", Statement::Inherit("native".to_string()))]
    #[case("require foo.inc", Statement::Include { path: "foo.inc".to_string(), required: true })]
    #[case("include ${BPN}-common.inc", Statement::Include { path: "${BPN}-common.inc".to_string(), required: false })]
    #[case("unset FOO", Statement::Unset("FOO".to_string()))]
    fn test_single_statement(#[case] line: &str, #[case] expected: Statement) {
        assert_eq!(parse_str(line), vec![expected]);
    }

    #[test]
    fn test_skips_functions_flags_and_directives() {
        let content = r#"
# A comment
do_install() {
    install -d ${D}${bindir}
    FOO = "not a variable"
}

python do_stuff() {
    bb.note("hi")
}

def helper(d):
    return "x"

do_fetch[depends] += "foo:do_populate_sysroot"
addtask do_stuff after do_install
EXPORT_FUNCTIONS do_configure
export PATH
LICENSE = "MIT"
"#;
        assert_eq!(parse_str(content), vec![assign("LICENSE", AssignOp::Set, "MIT")]);
    }

    #[test]
    fn test_line_continuations() {
        let content = "SRC_URI = \"file://a.patch \\\n           file://b.patch \\\n          \"\n";
        let statements = parse_str(content);
        assert_eq!(statements.len(), 1);
        let Statement::Assign { value, .. } = &statements[0] else { panic!("expected assignment") };
        assert_eq!(value.split_whitespace().collect::<Vec<_>>(), vec!["file://a.patch", "file://b.patch"]);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse(Path::new("broken.bb"), "FOO = \"ok\"\nthis is not bitbake\n").unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::Syntax {
                file: "broken.bb".into(),
                line: 2,
                statement: "this is not bitbake".to_string()
            }
        );
    }
}
