//! Template rendering for computed string slots.
//!
//! A template is text with `{scope}` or `{scope.slot.slot...}` fields;
//! `{{` and `}}` produce literal braces. Scopes are looked up by name,
//! case-insensitively, in an explicit [`RenderScopes`] list built by the
//! caller. Slot paths are resolved through a caller-supplied closure so this
//! module stays independent of how frames are stored.

use crate::{Error, Result};

/// How to treat a template that cannot be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Leniency {
  /// Propagate the failure.
  #[default]
  Strict,
  /// Fall back to the unrendered text. Used when dumping frames whose
  /// templates only make sense inside a derived frame.
  Lenient,
}

/// Ordered named scopes available to a template. Earlier entries win.
#[derive(Debug, Clone)]
pub struct RenderScopes<H> {
  scopes: Vec<(String, H)>,
}

impl<H> Default for RenderScopes<H> {
  fn default() -> Self { Self { scopes: Vec::new() } }
}

impl<H: Copy> RenderScopes<H> {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, name: impl Into<String>, handle: H) { self.scopes.push((name.into(), handle)); }

  pub fn get(&self, name: &str) -> Option<H> {
    self
      .scopes
      .iter()
      .find(|(scope, _)| scope.eq_ignore_ascii_case(name))
      .map(|(_, h)| *h)
  }

  pub fn len(&self) -> usize { self.scopes.len() }

  pub fn is_empty(&self) -> bool { self.scopes.is_empty() }
}

/// A parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
  Text(String),
  /// Scope name followed by the slot path to read from it.
  Field { scope: &'a str, path: Vec<&'a str> },
}

/// Split a template into literal text and fields.
pub fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
  let fail = |reason: String| Error::Template { template: template.to_owned(), reason };

  let mut segments = Vec::new();
  let mut text = String::new();
  let mut rest = template;
  while let Some(i) = rest.find(['{', '}']) {
    text.push_str(&rest[..i]);
    let tail = &rest[i..];
    if let Some(after) = tail.strip_prefix("{{") {
      text.push('{');
      rest = after;
    } else if let Some(after) = tail.strip_prefix("}}") {
      text.push('}');
      rest = after;
    } else if tail.starts_with('}') {
      return Err(fail("single '}' encountered".into()));
    } else {
      let close = tail.find('}').ok_or_else(|| fail("unclosed '{'".into()))?;
      let field = &tail[1..close];
      let mut parts = field.split('.');
      let scope = parts.next().unwrap_or_default().trim();
      let path: Vec<&str> = parts.map(str::trim).collect();
      if scope.is_empty() || path.iter().any(|p| p.is_empty()) {
        return Err(fail(format!("malformed field {{{field}}}")));
      }
      if field.contains([':', '!', '[', '{']) {
        return Err(fail(format!("unsupported field syntax {{{field}}}")));
      }
      if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(&mut text)));
      }
      segments.push(Segment::Field { scope, path });
      rest = &tail[close + 1..];
    }
  }
  text.push_str(rest);
  if !text.is_empty() {
    segments.push(Segment::Text(text));
  }
  Ok(segments)
}

/// Render `template` against `scopes`.
///
/// `resolve(handle, path)` produces the text for a field; a lookup miss it
/// reports is turned into [`Error::Template`], other errors propagate as is.
pub fn render<H, F>(template: &str, scopes: &RenderScopes<H>, mut resolve: F) -> Result<String>
where
  H: Copy,
  F: FnMut(H, &[&str]) -> Result<String>,
{
  let mut out = String::with_capacity(template.len());
  for segment in parse(template)? {
    match segment {
      Segment::Text(text) => out.push_str(&text),
      Segment::Field { scope, path } => {
        let handle = scopes.get(scope).ok_or_else(|| Error::Template {
          template: template.to_owned(),
          reason:   format!("unknown name {scope:?}"),
        })?;
        match resolve(handle, &path) {
          Ok(text) => out.push_str(&text),
          Err(e) if e.is_not_found() => {
            return Err(Error::Template { template: template.to_owned(), reason: e.to_string() });
          }
          Err(e) => return Err(e),
        }
      }
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scopes() -> RenderScopes<u32> {
    let mut s = RenderScopes::new();
    s.push("frame", 1);
    s.push("widget", 2);
    s
  }

  fn lookup(handle: u32, path: &[&str]) -> Result<String> {
    match (handle, path) {
      (1, []) => Ok("<frame 1>".into()),
      (1, ["size"]) => Ok("10".into()),
      (2, ["name"]) => Ok("gear".into()),
      _ => Err(Error::SlotNotFound { frame: handle.to_string(), name: path.join(".") }),
    }
  }

  #[test]
  fn renders_fields_and_escapes() {
    let out = render("{Widget.name} is {frame.size}mm {{approx}}", &scopes(), lookup).unwrap();
    assert_eq!(out, "gear is 10mm {approx}");
  }

  #[test]
  fn bare_scope_renders_the_scope_itself() {
    assert_eq!(render("at {frame}", &scopes(), lookup).unwrap(), "at <frame 1>");
  }

  #[test]
  fn unknown_scope_is_a_template_error() {
    let err = render("{gadget.name}", &scopes(), lookup).unwrap_err();
    assert!(matches!(err, Error::Template { .. }));
  }

  #[test]
  fn missing_slot_is_a_template_error() {
    let err = render("{widget.size}", &scopes(), lookup).unwrap_err();
    assert!(matches!(err, Error::Template { .. }));
  }

  #[test]
  fn malformed_templates_are_rejected() {
    assert!(parse("{frame").is_err());
    assert!(parse("oops}").is_err());
    assert!(parse("{}").is_err());
    assert!(parse("{frame.size:>4}").is_err());
  }

  #[test]
  fn parse_splits_text_and_fields() {
    let segments = parse("a{b.c.d}e").unwrap();
    assert_eq!(segments, vec![
      Segment::Text("a".into()),
      Segment::Field { scope: "b", path: vec!["c", "d"] },
      Segment::Text("e".into()),
    ]);
  }
}
