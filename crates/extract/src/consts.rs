use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// Variable names may carry override suffixes (`FOO:append`, `FOO_pn-bar`) and
// unexpanded references (`RDEPENDS:${PN}`).
regex!(
    ASSIGNMENT_REGEX,
    r#"^(?:export\s+)?(?P<var>[\w\-\.\+\{\}\$/~:]+?)(?:\[(?P<flag>[\w\-\.\+]+)\])?\s*(?P<op>\?\?=|\?=|:=|\+=|=\+|\.=|=\.|=)\s*(?:"(?P<dq>.*)"|'(?P<sq>.*)')\s*$"#
);
regex!(EXPORT_REGEX, r"^export\s+[\w\-\.\+\{\}\$/~:]+\s*$");
regex!(UNSET_REGEX, r"^unset\s+(?P<var>[\w\-\.\+\{\}\$/~:]+)(?:\[[\w\-\.\+]+\])?\s*$");
regex!(INHERIT_REGEX, r"^inherit(?:_defer)?\s+(?P<classes>.+)$");
regex!(INCLUDE_REGEX, r"^(?P<kind>include|require)\s+(?P<path>.+)$");
// Shell and python function bodies, including `python () {` anonymous functions.
regex!(
    FUNCTION_START_REGEX,
    r"^(?:fakeroot\s+)?(?:python\s+)?(?:[\w\-\.\+\{\}\$/~:]+\s*)?\(\s*\)\s*\{\s*$|^python\s+[\w\-\.\+\{\}\$/~:]+\s*\{\s*$"
);
regex!(PYTHON_DEF_REGEX, r"^def\s+\w+\s*\(.*\)\s*:\s*$");
regex!(
    DIRECTIVE_REGEX,
    r"^(?:addtask|deltask|addhandler|EXPORT_FUNCTIONS|addpylib|include_all)\b"
);
regex!(EXPANSION_REGEX, r"\$\{(?P<var>[\w\-\.\+/~:]+)\}");
regex!(MACHINE_BOILERPLATE_REGEX, r"Machine configuration for( running)*( an)*( the)*");
