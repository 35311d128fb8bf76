//! Glob pattern compilation and evaluation against the directory graph
//! grounded on `eden/fs/inodes/GlobNode.cpp`.

mod eval;

pub use eval::{evaluate, GlobEntry, GlobResult, GlobRoot, InodeGlobRoot, PrefetchList, TreeGlobRoot};

use crate::error::{Error, Result};

/// Splits `pattern` on the first `/`, reporting whether the token
/// contains any glob metacharacter (`*`, `?`, `[`, `\`).
fn tokenize(pattern: &str) -> (&str, bool, &str) {
    let mut has_specials = false;
    for (i, ch) in pattern.char_indices() {
        match ch {
            '*' | '?' | '[' | '\\' => has_specials = true,
            '/' => return (&pattern[..i], has_specials, &pattern[i + 1..]),
            _ => {}
        }
    }
    (pattern, has_specials, "")
}

/// One node of the pattern trie compiled from a set of glob patterns.
/// The root node itself never matches anything; it is purely a
/// container for the top-level [`GlobNode::children`].
pub struct GlobNode {
    pattern: String,
    include_dotfiles: bool,
    has_specials: bool,
    always_match: bool,
    matcher: Option<globset::GlobMatcher>,
    is_leaf: bool,
    children: Vec<Box<GlobNode>>,
    recursive_children: Vec<Box<GlobNode>>,
}

impl GlobNode {
    /// An empty root container for compiled patterns.
    pub fn root(include_dotfiles: bool) -> Self {
        Self {
            pattern: String::new(),
            include_dotfiles,
            has_specials: false,
            always_match: false,
            matcher: None,
            is_leaf: false,
            children: Vec::new(),
            recursive_children: Vec::new(),
        }
    }

    fn leaf(pattern: &str, include_dotfiles: bool, has_specials: bool) -> Result<Self> {
        let (always_match, matcher) = if include_dotfiles && (pattern == "**" || pattern == "*") {
            (true, None)
        } else {
            let glob = globset::Glob::new(pattern)?;
            (false, Some(glob.compile_matcher()))
        };
        Ok(Self {
            pattern: pattern.to_string(),
            include_dotfiles,
            has_specials,
            always_match,
            matcher,
            is_leaf: false,
            children: Vec::new(),
            recursive_children: Vec::new(),
        })
    }

    /// Compiles every pattern in `patterns` into this trie.
    pub fn compile_all(&mut self, patterns: &[String]) -> Result<()> {
        for pattern in patterns {
            self.parse(pattern)?;
        }
        Ok(())
    }

    /// Parses a single pattern into the trie, reusing existing nodes
    /// wherever an earlier pattern already produced the same token at
    /// the same position.
    fn parse(&mut self, pattern: &str) -> Result<()> {
        let include_dotfiles = self.include_dotfiles;
        let mut parent: &mut GlobNode = self;
        let mut remaining = pattern;

        while !remaining.is_empty() {
            let (token, has_specials, recursive, rest): (String, bool, bool, &str) =
                if let Some(suffix) = remaining.strip_prefix("**") {
                    let _ = suffix;
                    // A bare "**" is rewritten to "**/*" when dotfiles are
                    // excluded: GlobMatcher has no native "match any
                    // number of components" token, so we always compile
                    // recursive components as ordinary multi-segment glob
                    // patterns, and a lone "**" has nothing after it to
                    // anchor that compilation to.
                    let token = if remaining == "**" && !include_dotfiles {
                        "**/*".to_string()
                    } else {
                        remaining.to_string()
                    };
                    (token, true, true, "")
                } else {
                    let (token, has_specials, rest) = tokenize(remaining);
                    if !has_specials {
                        crate::model::validate_name(token).map_err(|_| {
                            Error::BadPattern(format!("{token:?} is not a valid path component"))
                        })?;
                    }
                    (token.to_string(), has_specials, false, rest)
                };

            let container =
                if recursive { &mut parent.recursive_children } else { &mut parent.children };
            let idx = match container.iter().position(|n| n.pattern == token) {
                Some(i) => i,
                None => {
                    container.push(Box::new(GlobNode::leaf(&token, include_dotfiles, has_specials)?));
                    container.len() - 1
                }
            };
            if rest.is_empty() {
                container[idx].is_leaf = true;
            }
            parent = &mut container[idx];
            remaining = rest;
        }
        Ok(())
    }

    /// True if `candidate` matches this node's pattern. A bare `*`/`**`
    /// with `include_dotfiles` never needed compiling a real matcher.
    /// Dotfile exclusion is applied uniformly: if any path segment of
    /// `candidate` starts with `.` and dotfiles are excluded, it never
    /// matches, regardless of the pattern's own literal prefix.
    fn matches(&self, candidate: &str) -> bool {
        if !self.include_dotfiles && candidate.split('/').any(|seg| seg.starts_with('.')) {
            return false;
        }
        if self.always_match {
            return true;
        }
        self.matcher.as_ref().map(|m| m.is_match(candidate)).unwrap_or(false)
    }

    pub fn children(&self) -> &[Box<GlobNode>] {
        &self.children
    }

    pub fn recursive_children(&self) -> &[Box<GlobNode>] {
        &self.recursive_children
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn has_specials(&self) -> bool {
        self.has_specials
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// A human-readable dump of the trie, one node per line, 2-space
    /// indent per depth. Intended for interactive debugging, not parsed
    /// by anything.
    pub fn debug_dump(&self) -> String {
        let mut out = String::new();
        self.debug_dump_into(&mut out, 0);
        out
    }

    fn debug_dump_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{indent}- GlobNode\n"));
        out.push_str(&format!("{indent}  alwaysMatch={}\n", self.always_match));
        out.push_str(&format!("{indent}  hasSpecials={}\n", self.has_specials));
        out.push_str(&format!("{indent}  includeDotfiles={}\n", self.include_dotfiles));
        out.push_str(&format!("{indent}  isLeaf={}\n", self.is_leaf));
        if self.pattern.is_empty() {
            out.push_str(&format!("{indent}  pattern is empty\n"));
        } else {
            out.push_str(&format!("{indent}  pattern: {}\n", self.pattern));
        }
        if !self.children.is_empty() {
            out.push_str(&format!("{indent}  children ({}):\n", self.children.len()));
            for child in &self.children {
                child.debug_dump_into(out, depth + 1);
            }
        }
        if !self.recursive_children.is_empty() {
            out.push_str(&format!(
                "{indent}  recursiveChildren ({}):\n",
                self.recursive_children.len()
            ));
            for child in &self.recursive_children {
                child.debug_dump_into(out, depth + 1);
            }
        }
    }
}

/// Compiles a set of glob patterns into a trie ready for evaluation.
pub fn compile(patterns: &[String], include_dotfiles: bool) -> Result<GlobNode> {
    let mut root = GlobNode::root(include_dotfiles);
    root.compile_all(patterns)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_literal_single_component() {
        let root = compile(&["foo.txt".to_string()], true).unwrap();
        assert_eq!(root.children().len(), 1);
        let child = &root.children()[0];
        assert!(!child.has_specials());
        assert!(child.is_leaf());
    }

    #[test]
    fn shares_common_prefix_nodes() {
        let patterns = vec!["src/*.rs".to_string(), "src/*.toml".to_string()];
        let root = compile(&patterns, true).unwrap();
        assert_eq!(root.children().len(), 1);
        let src = &root.children()[0];
        assert_eq!(src.children().len(), 2);
    }

    #[test]
    fn double_star_goes_to_recursive_children() {
        let root = compile(&["**/*.rs".to_string()], true).unwrap();
        assert!(root.children().is_empty());
        assert_eq!(root.recursive_children().len(), 1);
        assert!(root.recursive_children()[0].matches("a/b/c.rs"));
    }

    #[test]
    fn bare_double_star_excludes_dotfiles_by_default() {
        let root = compile(&["**".to_string()], false).unwrap();
        let node = &root.recursive_children()[0];
        assert_eq!(node.pattern(), "**/*");
        assert!(node.matches("a/b"));
        assert!(!node.matches("a/.hidden"));
    }

    #[test]
    fn bare_double_star_always_matches_when_dotfiles_included() {
        let root = compile(&["**".to_string()], true).unwrap();
        let node = &root.recursive_children()[0];
        assert!(node.matches("a/.hidden"));
    }

    #[test]
    fn rejects_invalid_literal_component() {
        // An empty component (leading slash) is not a legal path name.
        let err = compile(&["/foo".to_string()], true);
        assert!(err.is_err());
    }

    #[test]
    fn debug_dump_reports_pattern_and_leaf_state() {
        let root = compile(&["a.txt".to_string()], true).unwrap();
        let dump = root.debug_dump();
        assert!(dump.contains("pattern is empty"));
        assert!(dump.contains("pattern: a.txt"));
        assert!(dump.contains("isLeaf=true"));
    }
}
