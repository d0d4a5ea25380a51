//! Build constraints: which files of a directory belong to the target build
//!
//! Two mechanisms decide whether a `.go` file is compiled:
//!
//! - file name suffixes such as `_linux.go` or `_windows_amd64.go`
//! - `//go:build` expressions (or legacy `// +build` lines) before the package clause

use depviz_core::Config;
use thiserror::Error;

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Highest `go1.N` release tag considered satisfied.
const LATEST_MINOR: u32 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed build constraint {line:?}: {reason}")]
pub struct ConstraintError {
    pub line: String,
    pub reason: String,
}

/// Target platform used to select files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub cgo_enabled: bool,
}

impl BuildContext {
    pub fn new(goos: impl Into<String>, goarch: impl Into<String>, cgo_enabled: bool) -> Self {
        BuildContext {
            goos: goos.into(),
            goarch: goarch.into(),
            cgo_enabled,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.goos.clone(), config.goarch.clone(), config.cgo_enabled)
    }

    /// Whether a build tag holds for this target.
    pub fn tag_satisfied(&self, tag: &str) -> bool {
        if tag == self.goos || tag == self.goarch {
            return true;
        }
        match tag {
            "unix" => UNIX_OS.contains(&self.goos.as_str()),
            "cgo" => self.cgo_enabled,
            "gc" => true,
            // An android build also satisfies linux, and ios satisfies darwin.
            "linux" => self.goos == "android",
            "darwin" => self.goos == "ios",
            "solaris" => self.goos == "illumos",
            _ => tag
                .strip_prefix("go1.")
                .and_then(|minor| minor.parse::<u32>().ok())
                .is_some_and(|minor| minor <= LATEST_MINOR),
        }
    }

    /// `_GOOS`, `_GOARCH` and `_GOOS_GOARCH` file name suffixes.
    ///
    /// The part before the first underscore never constrains, so `linux.go` builds everywhere.
    pub fn matches_file_name(&self, name: &str) -> bool {
        let stem = name.strip_suffix(".go").unwrap_or(name);
        let stem = stem.strip_suffix("_test").unwrap_or(stem);
        let Some((_, rest)) = stem.split_once('_') else {
            return true;
        };

        let parts: Vec<&str> = rest.split('_').collect();
        let n = parts.len();
        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.tag_satisfied(parts[n - 2]) && self.tag_satisfied(parts[n - 1]);
        }
        let last = parts[n - 1];
        if KNOWN_OS.contains(&last) || KNOWN_ARCH.contains(&last) {
            return self.tag_satisfied(last);
        }
        true
    }

    /// Evaluate the constraint comments in a file's header.
    ///
    /// A `//go:build` line wins over `// +build` lines; several `// +build` lines must all hold.
    pub fn matches_header(&self, source: &str) -> Result<bool, ConstraintError> {
        let header = header_comments(source);

        if let Some(expr) = header
            .iter()
            .find_map(|line| line.strip_prefix("//go:build"))
        {
            return Expr::parse(expr).map(|e| e.eval(&|tag: &str| self.tag_satisfied(tag)));
        }

        for line in &header {
            let Some(rest) = line.strip_prefix("//") else {
                continue;
            };
            let Some(options) = rest.trim_start().strip_prefix("+build") else {
                continue;
            };
            if !self.plus_build_line(options) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Space-separated alternatives of comma-separated terms.
    fn plus_build_line(&self, options: &str) -> bool {
        options.split_whitespace().any(|alternative| {
            alternative.split(',').all(|term| match term.strip_prefix('!') {
                Some(tag) => !self.tag_satisfied(tag),
                None => self.tag_satisfied(term),
            })
        })
    }
}

/// Line comments before the package clause, trimmed. Block comments are skipped.
fn header_comments(source: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut in_block = false;
    for line in source.lines() {
        let mut line = line.trim();
        if in_block {
            match line.find("*/") {
                Some(end) => {
                    in_block = false;
                    line = line[end + 2..].trim();
                }
                None => continue,
            }
        }
        while let Some(rest) = line.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => line = rest[end + 2..].trim(),
                None => {
                    in_block = true;
                    line = "";
                }
            }
        }
        if line.is_empty() {
            continue;
        }
        if !line.starts_with("//") {
            break;
        }
        lines.push(line);
    }
    lines
}

/// A `//go:build` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

impl Expr {
    fn parse(line: &str) -> Result<Expr, ConstraintError> {
        let error = |reason: &str| ConstraintError {
            line: line.trim().to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(line).map_err(|c| error(&format!("unexpected character {:?}", c)))?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.or().ok_or_else(|| error("syntax error"))?;
        if parser.pos != parser.tokens.len() {
            return Err(error("unexpected token"));
        }
        Ok(expr)
    }

    fn eval(&self, tag: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Tag(name) => tag(name),
            Expr::Not(e) => !e.eval(tag),
            Expr::And(a, b) => a.eval(tag) && b.eval(tag),
            Expr::Or(a, b) => a.eval(tag) || b.eval(tag),
        }
    }
}

fn tokenize(line: &str) -> Result<Vec<Token>, char> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(c);
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        tag.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Tag(tag));
            }
            other => return Err(other),
        }
    }
    Ok(tokens)
}

/// Precedence climbing: `||` binds loosest, then `&&`, then `!`.
struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> Option<Expr> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Some(left)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Some(left)
    }

    fn not(&mut self) -> Option<Expr> {
        match self.peek()?.clone() {
            Token::Not => {
                self.pos += 1;
                Some(Expr::Not(Box::new(self.not()?)))
            }
            Token::Open => {
                self.pos += 1;
                let inner = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    return None;
                }
                self.pos += 1;
                Some(inner)
            }
            Token::Tag(name) => {
                self.pos += 1;
                Some(Expr::Tag(name))
            }
            _ => None,
        }
    }
}
