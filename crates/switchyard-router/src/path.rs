//! Segment trie for path templates.
//!
//! Templates are `/`-separated. A segment is either a literal (`users`), a
//! named parameter (`:id`) or a trailing wildcard (`*` or `*rest`). Literals
//! take priority over parameters and parameters over wildcards; when a
//! literal branch dead-ends the matcher backs up and tries the parameter
//! branch, so `/users/me` and `/users/:id/posts` can coexist.
//!
//! Captured parameters are percent-decoded, so `/users/john%20doe` yields
//! `john doe` for `/users/:name`.

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a template could not be inserted, or a path could not be matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The template is malformed.
    #[error("invalid path template: {0}")]
    Invalid(String),

    /// Two templates use different parameter names at the same position.
    #[error("parameter ':{found}' conflicts with existing ':{existing}'")]
    ConflictingParam {
        /// Name already indexed.
        existing: String,
        /// Name in the new template.
        found: String,
    },

    /// The template is already indexed.
    #[error("route already registered")]
    Duplicate,

    /// A matched parameter does not decode to UTF-8.
    #[error("path parameter ':{name}' is not valid UTF-8 once decoded")]
    Encoding {
        /// Parameter name.
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, PathError> {
    let raw: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let last = raw.len().saturating_sub(1);
    raw.iter()
        .enumerate()
        .map(|(index, segment)| {
            if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PathError::Invalid(format!("unnamed parameter in '{template}'")));
                }
                Ok(Segment::Param(name))
            } else if let Some(name) = segment.strip_prefix('*') {
                if index != last {
                    return Err(PathError::Invalid(format!(
                        "wildcard must be the last segment in '{template}'"
                    )));
                }
                Ok(Segment::Wildcard(if name.is_empty() { "*" } else { name }))
            } else {
                Ok(Segment::Literal(segment))
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: Option<T>,
    literals: BTreeMap<String, Node<T>>,
    param: Option<(String, Box<Node<T>>)>,
    wildcard: Option<(String, T)>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: None,
            literals: BTreeMap::new(),
            param: None,
            wildcard: None,
        }
    }
}

impl<T> Node<T> {
    fn insert(&mut self, segments: &[Segment<'_>], value: T) -> Result<(), PathError> {
        let Some((head, rest)) = segments.split_first() else {
            if self.value.is_some() {
                return Err(PathError::Duplicate);
            }
            self.value = Some(value);
            return Ok(());
        };

        match head {
            Segment::Literal(literal) => self
                .literals
                .entry((*literal).to_string())
                .or_default()
                .insert(rest, value),
            Segment::Param(name) => {
                let (existing, child) = self
                    .param
                    .get_or_insert_with(|| ((*name).to_string(), Box::default()));
                if existing.as_str() != *name {
                    return Err(PathError::ConflictingParam {
                        existing: existing.clone(),
                        found: (*name).to_string(),
                    });
                }
                child.insert(rest, value)
            }
            Segment::Wildcard(name) => {
                if self.wildcard.is_some() {
                    return Err(PathError::Duplicate);
                }
                self.wildcard = Some(((*name).to_string(), value));
                Ok(())
            }
        }
    }

    fn find<'a>(&'a self, segments: &[&str], params: &mut Vec<(String, String)>) -> Option<&'a T> {
        let Some((head, rest)) = segments.split_first() else {
            return self.value.as_ref().or_else(|| {
                self.wildcard.as_ref().map(|(name, value)| {
                    params.push((name.clone(), String::new()));
                    value
                })
            });
        };

        if let Some(found) = self
            .literals
            .get(*head)
            .and_then(|child| child.find(rest, params))
        {
            return Some(found);
        }

        if let Some((name, child)) = &self.param {
            params.push((name.clone(), (*head).to_string()));
            if let Some(found) = child.find(rest, params) {
                return Some(found);
            }
            params.pop();
        }

        self.wildcard.as_ref().map(|(name, value)| {
            params.push((name.clone(), segments.join("/")));
            value
        })
    }
}

/// Maps path templates to values.
#[derive(Debug, Clone)]
pub struct PathIndex<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for PathIndex<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<T> PathIndex<T> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `value` under `template`.
    pub fn insert(&mut self, template: &str, value: T) -> Result<(), PathError> {
        let segments = parse(template)?;
        self.root.insert(&segments, value)?;
        self.len += 1;
        Ok(())
    }

    /// Finds the value for a concrete path, with the decoded parameters.
    ///
    /// `path` must not include a query string. Returns `Ok(None)` when no
    /// template matches.
    pub fn find(&self, path: &str) -> Result<Option<(&T, Map<String, Value>)>, PathError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Vec::new();
        let Some(value) = self.root.find(&segments, &mut params) else {
            return Ok(None);
        };
        let params = params
            .into_iter()
            .map(|(name, raw)| match percent_decode_str(&raw).decode_utf8() {
                Ok(decoded) => Ok((name, Value::String(decoded.into_owned()))),
                Err(_) => Err(PathError::Encoding { name }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Some((value, params)))
    }

    /// Number of indexed templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(templates: &[&'static str]) -> PathIndex<&'static str> {
        let mut index = PathIndex::new();
        for template in templates {
            index.insert(template, *template).unwrap();
        }
        index
    }

    #[test]
    fn test_literal_and_param_matching() {
        let index = index(&["/items", "/items/:id", "/items/featured"]);
        assert_eq!(index.find("/items").unwrap().unwrap().0, &"/items");

        let (value, params) = index.find("/items/42").unwrap().unwrap();
        assert_eq!(*value, "/items/:id");
        assert_eq!(params.get("id"), Some(&json!("42")));

        let (value, params) = index.find("/items/featured").unwrap().unwrap();
        assert_eq!(*value, "/items/featured");
        assert!(params.is_empty());

        assert!(index.find("/items/42/extra").unwrap().is_none());
        assert!(index.find("/other").unwrap().is_none());
    }

    #[test]
    fn test_backtracks_from_literal_to_param() {
        let index = index(&["/users/me", "/users/:id/posts"]);
        let (value, params) = index.find("/users/me/posts").unwrap().unwrap();
        assert_eq!(*value, "/users/:id/posts");
        assert_eq!(params.get("id"), Some(&json!("me")));
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let index = index(&["/files/*path", "/static/*"]);
        let (_, params) = index.find("/files/a/b/c.txt").unwrap().unwrap();
        assert_eq!(params.get("path"), Some(&json!("a/b/c.txt")));
        let (_, params) = index.find("/static/app.js").unwrap().unwrap();
        assert_eq!(params.get("*"), Some(&json!("app.js")));
    }

    #[test]
    fn test_root_and_trailing_slash() {
        let index = index(&["/", "/health"]);
        assert_eq!(index.find("/").unwrap().unwrap().0, &"/");
        assert_eq!(index.find("/health/").unwrap().unwrap().0, &"/health");
    }

    #[test]
    fn test_params_are_percent_decoded() {
        let index = index(&["/users/:name", "/files/*path"]);
        let (_, params) = index.find("/users/john%20doe").unwrap().unwrap();
        assert_eq!(params.get("name"), Some(&json!("john doe")));

        let (_, params) = index.find("/files/a%2Fb/caf%C3%A9.txt").unwrap().unwrap();
        assert_eq!(params.get("path"), Some(&json!("a/b/café.txt")));

        assert_eq!(
            index.find("/users/%FF").unwrap_err(),
            PathError::Encoding { name: "name".into() }
        );
    }

    #[test]
    fn test_insert_errors() {
        let mut index = PathIndex::new();
        index.insert("/items/:id", 1).unwrap();
        assert_eq!(index.insert("/items/:id", 2), Err(PathError::Duplicate));
        assert_eq!(
            index.insert("/items/:name/tags", 3),
            Err(PathError::ConflictingParam {
                existing: "id".into(),
                found: "name".into()
            })
        );
        assert!(matches!(index.insert("/a/:/b", 4), Err(PathError::Invalid(_))));
        assert!(matches!(index.insert("/a/*rest/b", 5), Err(PathError::Invalid(_))));
        assert_eq!(index.len(), 1);
    }
}
