//! JBolt order file
//!
//! Plain text, one record per line:
//!
//! ```text
//! # comment
//! M <size> <holder> <name> <signature>
//! C
//! ```
//!
//! `M` lines list methods hottest first with their code size in bytes. `C`
//! lines separate call-graph components; they are written for readability and
//! skipped when loading. Empty lines are ignored. Dotted holder names are
//! normalized to the internal `/` form on load.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::config::MAX_SIZE_OPTION;
use crate::error::{JBoltError, Result};
use crate::heap::padded_size;
use crate::method::MethodKey;
use crate::reorder::ranking::RankingSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEntry {
    Method { method: MethodKey, size: usize },
    Separator,
}

/// A parsed or recorded method order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFile {
    entries: Vec<OrderEntry>,
    sizes: IndexMap<MethodKey, usize>,
}

impl OrderFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(method, size)` pairs, hottest first
    pub fn from_methods(methods: impl IntoIterator<Item = (MethodKey, usize)>) -> Self {
        let mut order = Self::new();
        for (method, size) in methods {
            // duplicates cannot be expressed in a file
            let _ = order.push_method(method, size);
        }
        order
    }

    pub fn push_method(&mut self, method: MethodKey, size: usize) -> Result<()> {
        if self.sizes.contains_key(&method) {
            return Err(JBoltError::OrderFile(format!(
                "Duplicated method: {{{}}}!",
                method
            )));
        }
        self.sizes.insert(method.clone(), size);
        self.entries.push(OrderEntry::Method { method, size });
        Ok(())
    }

    pub fn push_separator(&mut self) {
        self.entries.push(OrderEntry::Separator);
    }

    pub fn entries(&self) -> &[OrderEntry] {
        &self.entries
    }

    /// Methods in order
    pub fn methods(&self) -> impl Iterator<Item = (&MethodKey, usize)> {
        self.sizes.iter().map(|(method, size)| (method, *size))
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn contains(&self, method: &MethodKey) -> bool {
        self.sizes.contains_key(method)
    }

    /// Bytes needed to hold every listed method
    pub fn total_padded_size(&self) -> usize {
        self.sizes
            .values()
            .fold(0usize, |total, size| total.saturating_add(padded_size(*size)))
    }

    /// Parse order file text
    pub fn parse(text: &str) -> Result<Self> {
        let mut order = Self::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            match line.chars().next() {
                None | Some('#') => continue,
                Some('C') if line.len() == 1 || line[1..].starts_with(' ') => {
                    order.push_separator();
                }
                Some('M') => {
                    let (method, size) = parse_method_line(line)?;
                    order.push_method(method, size)?;
                }
                _ => return Err(wrong_format(line)),
            }
        }
        Ok(order)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Render in the on-disk format
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match entry {
                OrderEntry::Method { method, size } => {
                    let _ = writeln!(out, "M {} {}", size, method);
                }
                OrderEntry::Separator => out.push_str("C\n"),
            }
        }
        out
    }

    /// Write to `path`, replacing any existing file
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }
}

impl RankingSource for OrderFile {
    fn ranking(&self) -> Vec<MethodKey> {
        self.sizes.keys().cloned().collect()
    }
}

fn wrong_format(line: &str) -> JBoltError {
    JBoltError::OrderFile(format!("Wrong format of JBolt order line! line=\"{}\".", line))
}

fn parse_method_line(line: &str) -> Result<(MethodKey, usize)> {
    let rest = line.strip_prefix("M ").ok_or_else(|| wrong_format(line))?;
    let (size, rest) = rest.split_once(' ').ok_or_else(|| wrong_format(line))?;
    let size: usize = size
        .parse()
        .ok()
        .filter(|size| *size <= MAX_SIZE_OPTION)
        .ok_or_else(|| wrong_format(line))?;

    let mut parts = rest.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(holder), Some(name), Some(signature))
            if !holder.is_empty() && !name.is_empty() && !signature.is_empty() =>
        {
            // class names may be written with dots, members keep theirs
            let holder = holder.replace('.', "/");
            Ok((MethodKey::new(holder, name, signature), size))
        }
        _ => Err(wrong_format(line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_methods_and_separators() {
        let text = "\
# hot set
M 120 java/lang/String hashCode ()I
C

M 64 java.util.HashMap get (Ljava/lang/Object;)Ljava/lang/Object;
";
        let order = OrderFile::parse(text).unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order.entries().len(), 3);

        let methods: Vec<_> = order.methods().collect();
        assert_eq!(methods[0].0, &MethodKey::new("java/lang/String", "hashCode", "()I"));
        assert_eq!(methods[0].1, 120);
        assert_eq!(methods[1].0.holder, "java/util/HashMap");
    }

    #[test]
    fn test_wrong_format_line() {
        let err = OrderFile::parse("X garbage").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Wrong format of JBolt order line! line=\"X garbage\"."
        );

        assert!(OrderFile::parse("M abc a b c").is_err());
        assert!(OrderFile::parse("M 12 only-holder").is_err());
        assert!(OrderFile::parse("Mx 12 a b c").is_err());
    }

    #[test]
    fn test_dots_rewritten_in_holder_only() {
        let method = MethodKey::new("app/Outer$Inner", "lambda.0", "(Lapp.Token;)V");
        let order = OrderFile::from_methods(vec![(method.clone(), 96)]);

        let reloaded = OrderFile::parse("M 96 app.Outer$Inner lambda.0 (Lapp.Token;)V\n").unwrap();
        assert_eq!(reloaded.ranking(), vec![method.clone()]);
        assert_eq!(OrderFile::parse(&order.render()).unwrap(), order);
    }

    #[test]
    fn test_oversized_method_size_rejected() {
        let line = format!("M {} a b ()V", usize::MAX);
        assert_eq!(
            OrderFile::parse(&line).unwrap_err().to_string(),
            format!("Wrong format of JBolt order line! line=\"{}\".", line)
        );
    }

    #[test]
    fn test_duplicated_method() {
        let err = OrderFile::parse("M 1 a b ()V\nM 2 a b ()V\n").unwrap_err();
        assert_eq!(err.to_string(), "Duplicated method: {a b ()V}!");
    }

    #[test]
    fn test_render_format() {
        let mut order = OrderFile::new();
        order.push_method(MethodKey::new("a/A", "run", "()V"), 100).unwrap();
        order.push_separator();
        order.push_method(MethodKey::new("b/B", "call", "(I)I"), 8).unwrap();

        assert_eq!(order.render(), "M 100 a/A run ()V\nC\nM 8 b/B call (I)I\n");
        assert_eq!(OrderFile::parse(&order.render()).unwrap(), order);
    }

    #[test]
    fn test_total_padded_size() {
        let order = OrderFile::from_methods(vec![
            (MethodKey::new("a", "x", "()V"), 1),
            (MethodKey::new("a", "y", "()V"), 65),
        ]);
        assert_eq!(order.total_padded_size(), 64 + 128);
        assert_eq!(order.ranking().len(), 2);
    }

    #[test]
    fn test_load_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.txt");
        let order = OrderFile::from_methods(vec![(MethodKey::new("a", "x", "()V"), 10)]);
        order.write(&path).unwrap();
        assert_eq!(OrderFile::load(&path).unwrap(), order);
        assert!(matches!(
            OrderFile::load(&dir.path().join("missing")),
            Err(JBoltError::Io(_))
        ));
    }
}
