//! Kernel command line parameters.

use std::fmt;

/// Ordered parameter map. Bare flags have no value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdlineParams {
    params: Vec<(String, Option<String>)>,
}

impl CmdlineParams {
    /// Parse `/proc/cmdline` text.
    ///
    /// Double quotes group whitespace and are removed, as the kernel does. A
    /// repeated parameter keeps its first position and takes the last value.
    pub fn parse(text: &str) -> Self {
        let mut params = Self::default();
        for token in tokenize(text) {
            match token.split_once('=') {
                Some((name, value)) => params.insert(name, Some(value.to_string())),
                None => params.insert(&token, None),
            }
        }
        params
    }

    pub fn insert(&mut self, name: &str, value: Option<String>) {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
    }

    /// `None` if absent, `Some(None)` for a bare flag.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Option<&'a str>)> for CmdlineParams {
    fn from_iter<I: IntoIterator<Item = (&'a str, Option<&'a str>)>>(iter: I) -> Self {
        let mut params = Self::default();
        for (name, value) in iter {
            params.insert(name, value.map(str::to_string));
        }
        params
    }
}

impl fmt::Display for CmdlineParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match value {
                Some(v) if v.is_empty() || v.contains(char::is_whitespace) => {
                    write!(f, "{}=\"{}\"", name, v)?
                }
                Some(v) => write!(f, "{}={}", name, v)?,
                None => f.write_str(name)?,
            }
        }
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens.retain(|t| !t.is_empty());
    tokens
}
