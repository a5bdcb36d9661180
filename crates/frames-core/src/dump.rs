//! Indented text rendering of a frame, for diagnostics.

use crate::{
  Result,
  context::VersionContext,
  frame::{FrameHandle, Value},
  slot::{AKO, FrameId, ISA, frame_ref},
  store::SlotStore,
  template::Leniency,
};

impl<S: SlotStore> VersionContext<'_, S> {
  /// Render every visible slot of `h`, sorted by name, nesting referenced
  /// frames and lists. Templates that fail to render are shown unrendered.
  ///
  /// `ako`/`isa` links and frames already being dumped further up are
  /// printed as references rather than expanded.
  pub fn dump(&mut self, h: FrameHandle) -> Result<String> {
    let mut lines = Vec::new();
    let mut stack = vec![self.frame_id_of(h)];
    self.dump_into(h, 0, &mut stack, &mut lines)?;
    Ok(lines.join("\n"))
  }

  fn dump_into(
    &mut self,
    h: FrameHandle,
    indent: usize,
    stack: &mut Vec<FrameId>,
    lines: &mut Vec<String>,
  ) -> Result<()> {
    let pad = " ".repeat(indent);
    for name in self.get_slot_names(h)? {
      let value = self.get_slot_with(h, &name, Leniency::Lenient)?;
      match value {
        Value::Frame(frame) if name != AKO && name != ISA && !stack.contains(&self.frame_id_of(frame)) => {
          lines.push(format!("{pad}{name}:"));
          self.dump_nested(frame, indent + 2, stack, lines)?;
        }
        Value::List(items) => {
          lines.push(format!("{pad}{name}: ["));
          let mut need_sep = false;
          for item in items {
            match item {
              Value::Frame(frame) if !stack.contains(&self.frame_id_of(frame)) => {
                if need_sep {
                  lines.push(String::new());
                }
                self.dump_nested(frame, indent + 2, stack, lines)?;
                need_sep = true;
              }
              other => {
                lines.push(format!("{pad}  {},", self.scalar_text(&other)));
                need_sep = false;
              }
            }
          }
          lines.push(format!("{pad}]"));
        }
        other => lines.push(format!("{pad}{name}: {}", self.scalar_text(&other))),
      }
    }
    Ok(())
  }

  fn dump_nested(
    &mut self,
    frame: FrameHandle,
    indent: usize,
    stack: &mut Vec<FrameId>,
    lines: &mut Vec<String>,
  ) -> Result<()> {
    stack.push(self.frame_id_of(frame));
    let dumped = self.dump_into(frame, indent, stack, lines);
    stack.pop();
    dumped
  }

  /// Frames as `$label`, text quoted.
  fn scalar_text(&self, value: &Value) -> String {
    match value {
      Value::Text(text) => format!("{text:?}"),
      Value::Frame(h) => frame_ref(&self.frame_label(*h)),
      Value::List(_) => self.value_text(value),
    }
  }
}
