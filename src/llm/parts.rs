//! Incremental merging of streamed deltas into response parts.
//!
//! Providers stream a response as interleaved deltas, each keyed by a
//! vendor-assigned [`VendorPartId`]. The [`PartsManager`] owns one slot per
//! vendor id, creates a part the first time an id is seen, and merges later
//! deltas into it. Slots keep first-seen order regardless of the numeric value
//! of the vendor id.
//!
//! A delta is validated in full before any state changes, so a rejected delta
//! leaves the manager exactly as it was.

use crate::error::PartsError;
use crate::messages::{
    Part, PartDelta, PartKind, ResponseStreamEvent, TextPart, ThinkingPart, ToolArgsDelta,
    ToolCallArgs, ToolCallPart,
};
use crate::types::{ToolCallId, VendorPartId};
use serde_json::Map;
use std::collections::HashMap;

/// A normalized delta decoded from a provider chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaEvent {
    /// Text to append to a text part
    TextPartDelta {
        /// Slot key
        vendor_id: VendorPartId,
        /// Text to append
        content_delta: String,
    },
    /// Thinking text or a signature for a thinking part
    ThinkingPartDelta {
        /// Slot key
        vendor_id: VendorPartId,
        /// Thinking text to append
        content_delta: Option<String>,
        /// Signature to set
        signature_delta: Option<String>,
    },
    /// Name, arguments or id for a tool call part
    ToolCallPartDelta {
        /// Slot key
        vendor_id: VendorPartId,
        /// Tool name, applied only if the part has none yet
        tool_name: Option<String>,
        /// Argument update, merged with the manager's strategy
        args_delta: Option<ToolArgsDelta>,
        /// Provider-assigned call id
        tool_call_id: Option<String>,
    },
    /// A complete part installed at a slot, replacing anything already there
    PartStart {
        /// Slot key
        vendor_id: VendorPartId,
        /// The initial part
        part: Part,
    },
}

impl DeltaEvent {
    /// Creates a text delta.
    #[must_use]
    pub fn text(vendor_id: impl Into<VendorPartId>, content_delta: impl Into<String>) -> Self {
        Self::TextPartDelta {
            vendor_id: vendor_id.into(),
            content_delta: content_delta.into(),
        }
    }

    /// Creates a thinking content delta.
    #[must_use]
    pub fn thinking(vendor_id: impl Into<VendorPartId>, content_delta: impl Into<String>) -> Self {
        Self::ThinkingPartDelta {
            vendor_id: vendor_id.into(),
            content_delta: Some(content_delta.into()),
            signature_delta: None,
        }
    }

    /// Creates a tool call delta.
    #[must_use]
    pub fn tool_call(
        vendor_id: impl Into<VendorPartId>,
        tool_name: Option<String>,
        args_delta: Option<ToolArgsDelta>,
        tool_call_id: Option<String>,
    ) -> Self {
        Self::ToolCallPartDelta {
            vendor_id: vendor_id.into(),
            tool_name,
            args_delta,
            tool_call_id,
        }
    }

    /// Creates a part start event.
    #[must_use]
    pub fn part_start(vendor_id: impl Into<VendorPartId>, part: impl Into<Part>) -> Self {
        Self::PartStart {
            vendor_id: vendor_id.into(),
            part: part.into(),
        }
    }

    /// Returns the slot key this delta targets.
    #[must_use]
    pub fn vendor_id(&self) -> &VendorPartId {
        match self {
            Self::TextPartDelta { vendor_id, .. }
            | Self::ThinkingPartDelta { vendor_id, .. }
            | Self::ToolCallPartDelta { vendor_id, .. }
            | Self::PartStart { vendor_id, .. } => vendor_id,
        }
    }
}

/// How tool call argument deltas are merged.
///
/// Chosen when the manager is built and fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgsMergeStrategy {
    /// Arguments arrive as JSON text fragments that are concatenated
    #[default]
    JsonFragments,
    /// Arguments arrive as mappings whose keys overwrite earlier keys
    Mapping,
}

impl ArgsMergeStrategy {
    /// Returns the strategy's name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::JsonFragments => "json-fragments",
            Self::Mapping => "mapping",
        }
    }
}

/// The outcome of applying one delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Slot position in first-seen order
    pub part_index: usize,
    /// True if the delta created the slot
    pub is_new_part: bool,
    /// The normalized event to publish, if the delta produced a visible change
    pub event: Option<ResponseStreamEvent>,
}

/// A slot's content.
#[derive(Debug, Clone, PartialEq)]
enum ManagedPart {
    /// A part that can be reported
    Complete(Part),
    /// A tool call seen only by id so far; hidden until its name arrives
    PendingToolCall {
        tool_call_id: String,
        args: ToolCallArgs,
    },
}

impl ManagedPart {
    fn kind(&self) -> PartKind {
        match self {
            Self::Complete(part) => part.kind(),
            Self::PendingToolCall { .. } => PartKind::ToolCall,
        }
    }
}

/// Merges streamed deltas into an ordered collection of parts.
#[derive(Debug, Clone, Default)]
pub struct PartsManager {
    slots: Vec<ManagedPart>,
    by_vendor_id: HashMap<VendorPartId, usize>,
    strategy: ArgsMergeStrategy,
}

impl PartsManager {
    /// Creates an empty manager that merges tool call args with `strategy`.
    #[must_use]
    pub fn new(strategy: ArgsMergeStrategy) -> Self {
        Self {
            slots: Vec::new(),
            by_vendor_id: HashMap::new(),
            strategy,
        }
    }

    /// Returns the args merge strategy.
    #[must_use]
    pub fn strategy(&self) -> ArgsMergeStrategy {
        self.strategy
    }

    /// Returns the number of slots, including tool calls still waiting for a name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no delta has been applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the slot position for a vendor id.
    #[must_use]
    pub fn index_of(&self, vendor_id: &VendorPartId) -> Option<usize> {
        self.by_vendor_id.get(vendor_id).copied()
    }

    /// Returns the reportable part at a vendor id.
    #[must_use]
    pub fn part(&self, vendor_id: &VendorPartId) -> Option<&Part> {
        match self.slots.get(self.index_of(vendor_id)?)? {
            ManagedPart::Complete(part) => Some(part),
            ManagedPart::PendingToolCall { .. } => None,
        }
    }

    /// Returns the parts in first-seen order.
    ///
    /// Tool calls whose name has not arrived yet are omitted.
    #[must_use]
    pub fn get_parts(&self) -> Vec<Part> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                ManagedPart::Complete(part) => Some(part.clone()),
                ManagedPart::PendingToolCall { .. } => None,
            })
            .collect()
    }

    /// Applies one delta.
    ///
    /// # Errors
    ///
    /// Returns a [`PartsError`] if the delta conflicts with the part at its
    /// slot, if a new tool call has neither name nor id, or if tool call args
    /// do not match the merge strategy. No state changes on error.
    pub fn apply(&mut self, event: DeltaEvent) -> Result<Applied, PartsError> {
        match event {
            DeltaEvent::TextPartDelta {
                vendor_id,
                content_delta,
            } => self.handle_text_delta(vendor_id, content_delta),
            DeltaEvent::ThinkingPartDelta {
                vendor_id,
                content_delta,
                signature_delta,
            } => self.handle_thinking_delta(vendor_id, content_delta, signature_delta),
            DeltaEvent::ToolCallPartDelta {
                vendor_id,
                tool_name,
                args_delta,
                tool_call_id,
            } => self.handle_tool_call_delta(vendor_id, tool_name, args_delta, tool_call_id),
            DeltaEvent::PartStart { vendor_id, part } => Ok(self.handle_part_start(vendor_id, part)),
        }
    }

    /// Appends text to the text part at `vendor_id`, creating it if unseen.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingPartKind` if the slot holds a non-text part.
    pub fn handle_text_delta(
        &mut self,
        vendor_id: VendorPartId,
        content_delta: String,
    ) -> Result<Applied, PartsError> {
        let Some(index) = self.index_of(&vendor_id) else {
            let part = Part::from(TextPart::new(content_delta));
            return Ok(self.push(vendor_id, ManagedPart::Complete(part)));
        };

        match &mut self.slots[index] {
            ManagedPart::Complete(Part::Text(text)) => {
                text.content.push_str(&content_delta);
                Ok(Applied {
                    part_index: index,
                    is_new_part: false,
                    event: Some(ResponseStreamEvent::PartDelta {
                        index,
                        delta: PartDelta::Text { content_delta },
                    }),
                })
            }
            other => Err(PartsError::conflicting_part_kind(
                vendor_id,
                other.kind(),
                PartKind::Text,
            )),
        }
    }

    /// Appends thinking text and sets the signature of the thinking part at
    /// `vendor_id`, creating it if unseen.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingPartKind` if the slot holds a non-thinking part.
    pub fn handle_thinking_delta(
        &mut self,
        vendor_id: VendorPartId,
        content_delta: Option<String>,
        signature_delta: Option<String>,
    ) -> Result<Applied, PartsError> {
        let Some(index) = self.index_of(&vendor_id) else {
            let part = Part::from(ThinkingPart {
                content: content_delta.unwrap_or_default(),
                signature: signature_delta,
            });
            return Ok(self.push(vendor_id, ManagedPart::Complete(part)));
        };

        match &mut self.slots[index] {
            ManagedPart::Complete(Part::Thinking(thinking)) => {
                if let Some(content) = &content_delta {
                    thinking.content.push_str(content);
                }
                if let Some(signature) = &signature_delta {
                    thinking.signature = Some(signature.clone());
                }
                Ok(Applied {
                    part_index: index,
                    is_new_part: false,
                    event: Some(ResponseStreamEvent::PartDelta {
                        index,
                        delta: PartDelta::Thinking {
                            content_delta,
                            signature_delta,
                        },
                    }),
                })
            }
            other => Err(PartsError::conflicting_part_kind(
                vendor_id,
                other.kind(),
                PartKind::Thinking,
            )),
        }
    }

    /// Merges a tool call delta into the part at `vendor_id`, creating it if
    /// unseen.
    ///
    /// A new tool call needs a name or an id. One created from an id alone is
    /// held back from [`get_parts`](Self::get_parts) until its name arrives.
    /// The tool name is only taken if the part has none. The call id is fixed
    /// when the part is created: the provider's id if one was given,
    /// otherwise a generated [`ToolCallId`].
    ///
    /// # Errors
    ///
    /// Returns `IncompleteToolCall`, `ConflictingPartKind` or
    /// `ArgsStrategyMismatch`.
    pub fn handle_tool_call_delta(
        &mut self,
        vendor_id: VendorPartId,
        tool_name: Option<String>,
        args_delta: Option<ToolArgsDelta>,
        tool_call_id: Option<String>,
    ) -> Result<Applied, PartsError> {
        let tool_name = tool_name.filter(|name| !name.is_empty());

        let Some(index) = self.index_of(&vendor_id) else {
            let args = self.merge_args(&vendor_id, ToolCallArgs::default(), args_delta.as_ref())?;
            let slot = match (tool_name, tool_call_id) {
                (Some(name), id) => ManagedPart::Complete(Part::from(ToolCallPart::new(
                    name,
                    args,
                    id.unwrap_or_else(|| ToolCallId::new().to_string()),
                ))),
                (None, Some(id)) => ManagedPart::PendingToolCall {
                    tool_call_id: id,
                    args,
                },
                (None, None) => return Err(PartsError::incomplete_tool_call(vendor_id)),
            };
            return Ok(self.push(vendor_id, slot));
        };

        let updated = match &self.slots[index] {
            ManagedPart::Complete(Part::ToolCall(call)) => {
                let args = self.merge_args(&vendor_id, call.args.clone(), args_delta.as_ref())?;
                let name_applied = call.tool_name.is_empty() && tool_name.is_some();
                let mut call = call.clone();
                call.args = args;
                if name_applied {
                    call.tool_name = tool_name.clone().unwrap_or_default();
                }
                let event = ResponseStreamEvent::PartDelta {
                    index,
                    delta: PartDelta::ToolCall {
                        tool_name_delta: if name_applied { tool_name } else { None },
                        args_delta,
                        tool_call_id,
                    },
                };
                (ManagedPart::Complete(Part::ToolCall(call)), Some(event))
            }
            ManagedPart::PendingToolCall {
                tool_call_id: pending_id,
                args,
            } => {
                let args = self.merge_args(&vendor_id, args.clone(), args_delta.as_ref())?;
                match tool_name {
                    Some(name) => {
                        let part = Part::from(ToolCallPart::new(name, args, pending_id.clone()));
                        let event = ResponseStreamEvent::PartStart {
                            index,
                            part: part.clone(),
                        };
                        (ManagedPart::Complete(part), Some(event))
                    }
                    None => (
                        ManagedPart::PendingToolCall {
                            tool_call_id: pending_id.clone(),
                            args,
                        },
                        None,
                    ),
                }
            }
            other => {
                return Err(PartsError::conflicting_part_kind(
                    vendor_id,
                    other.kind(),
                    PartKind::ToolCall,
                ))
            }
        };

        let (slot, event) = updated;
        self.slots[index] = slot;
        Ok(Applied {
            part_index: index,
            is_new_part: false,
            event,
        })
    }

    /// Installs `part` at `vendor_id`.
    ///
    /// An occupied slot is reset in place: the new part replaces whatever was
    /// accumulated there and keeps the slot's first-seen position.
    pub fn handle_part_start(&mut self, vendor_id: VendorPartId, part: Part) -> Applied {
        let part = match part {
            Part::ToolCall(mut call) if call.tool_call_id.is_empty() => {
                call.tool_call_id = ToolCallId::new().to_string();
                Part::ToolCall(call)
            }
            other => other,
        };

        match self.index_of(&vendor_id) {
            Some(index) => {
                tracing::trace!(vendor_id = %vendor_id, index, kind = %part.kind(), "part reset");
                self.slots[index] = ManagedPart::Complete(part.clone());
                Applied {
                    part_index: index,
                    is_new_part: false,
                    event: Some(ResponseStreamEvent::PartStart { index, part }),
                }
            }
            None => self.push(vendor_id, ManagedPart::Complete(part)),
        }
    }

    fn push(&mut self, vendor_id: VendorPartId, slot: ManagedPart) -> Applied {
        let index = self.slots.len();
        let event = match &slot {
            ManagedPart::Complete(part) => Some(ResponseStreamEvent::PartStart {
                index,
                part: part.clone(),
            }),
            ManagedPart::PendingToolCall { .. } => None,
        };
        tracing::trace!(vendor_id = %vendor_id, index, kind = %slot.kind(), "part created");
        self.slots.push(slot);
        self.by_vendor_id.insert(vendor_id, index);
        Applied {
            part_index: index,
            is_new_part: true,
            event,
        }
    }

    fn merge_args(
        &self,
        vendor_id: &VendorPartId,
        current: ToolCallArgs,
        delta: Option<&ToolArgsDelta>,
    ) -> Result<ToolCallArgs, PartsError> {
        let Some(delta) = delta else {
            return Ok(current);
        };
        let mismatch = || PartsError::args_strategy_mismatch(vendor_id.clone(), self.strategy.name());

        match (self.strategy, current, delta) {
            (ArgsMergeStrategy::JsonFragments, ToolCallArgs::Json(mut text), ToolArgsDelta::Fragment(fragment)) => {
                text.push_str(fragment);
                Ok(ToolCallArgs::Json(text))
            }
            (ArgsMergeStrategy::Mapping, current, ToolArgsDelta::Mapping(entries)) => {
                let mut map = match current {
                    ToolCallArgs::Map(map) => map,
                    ToolCallArgs::Json(text) if text.is_empty() => Map::new(),
                    ToolCallArgs::Json(_) => return Err(mismatch()),
                };
                for (key, value) in entries {
                    map.insert(key.clone(), value.clone());
                }
                Ok(ToolCallArgs::Map(map))
            }
            _ => Err(mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(s: &str) -> Option<ToolArgsDelta> {
        Some(ToolArgsDelta::Fragment(s.to_string()))
    }

    fn mapping(value: serde_json::Value) -> Option<ToolArgsDelta> {
        value.as_object().cloned().map(ToolArgsDelta::Mapping)
    }

    #[test]
    fn text_deltas_concatenate_without_separator() {
        let mut manager = PartsManager::default();
        for chunk in ["Hel", "lo", ", ", "world"] {
            manager.apply(DeltaEvent::text(0usize, chunk)).unwrap();
        }

        let parts = manager.get_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].as_text(), Some("Hello, world"));
    }

    #[test]
    fn first_text_delta_creates_part() {
        let mut manager = PartsManager::default();
        let applied = manager.apply(DeltaEvent::text(0usize, "Hi")).unwrap();

        assert_eq!(applied.part_index, 0);
        assert!(applied.is_new_part);
        assert!(matches!(
            applied.event,
            Some(ResponseStreamEvent::PartStart { index: 0, .. })
        ));

        let applied = manager.apply(DeltaEvent::text(0usize, "!")).unwrap();
        assert!(!applied.is_new_part);
        assert!(matches!(
            applied.event,
            Some(ResponseStreamEvent::PartDelta { index: 0, .. })
        ));
    }

    #[test]
    fn parts_keep_first_seen_order() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text(2usize, "two")).unwrap();
        manager.apply(DeltaEvent::text(0usize, "zero")).unwrap();
        manager.apply(DeltaEvent::text(1usize, "one")).unwrap();
        manager.apply(DeltaEvent::text(0usize, "!")).unwrap();

        let texts: Vec<_> = manager
            .get_parts()
            .iter()
            .filter_map(|p| p.as_text().map(str::to_string))
            .collect();
        assert_eq!(texts, vec!["two", "zero!", "one"]);
    }

    #[test]
    fn string_and_integer_vendor_ids_are_distinct_slots() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text("content", "text")).unwrap();
        manager
            .apply(DeltaEvent::tool_call(
                0usize,
                Some("search".into()),
                fragment("{}"),
                Some("call_1".into()),
            ))
            .unwrap();

        assert_eq!(manager.get_parts().len(), 2);
    }

    #[test]
    fn text_delta_on_tool_call_conflicts_without_mutation() {
        let mut manager = PartsManager::default();
        manager
            .apply(DeltaEvent::tool_call(
                0usize,
                Some("search".into()),
                fragment(r#"{"q":"#),
                None,
            ))
            .unwrap();
        let before = manager.get_parts();

        let error = manager.apply(DeltaEvent::text(0usize, "oops")).unwrap_err();

        assert!(error.is_conflicting_part_kind());
        assert_eq!(manager.get_parts(), before);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn tool_call_without_name_or_id_is_incomplete() {
        let mut manager = PartsManager::default();
        let error = manager
            .apply(DeltaEvent::tool_call(3usize, None, fragment("{"), None))
            .unwrap_err();

        assert!(error.is_incomplete_tool_call());
        assert!(manager.is_empty());
    }

    #[test]
    fn tool_call_name_is_first_seen_and_args_concatenate() {
        let mut manager = PartsManager::default();
        manager
            .apply(DeltaEvent::tool_call(
                0usize,
                Some("get_weather".into()),
                fragment(r#"{"city": "#),
                Some("call_abc".into()),
            ))
            .unwrap();
        manager
            .apply(DeltaEvent::tool_call(
                0usize,
                Some("other_name".into()),
                fragment(r#""London"}"#),
                Some("call_other".into()),
            ))
            .unwrap();

        let parts = manager.get_parts();
        let call = parts[0].as_tool_call().unwrap();
        assert_eq!(call.tool_name, "get_weather");
        assert_eq!(call.tool_call_id, "call_abc");
        assert_eq!(call.args_as_map().unwrap()["city"], "London");
    }

    #[test]
    fn tool_call_without_provider_id_gets_generated_id() {
        let mut manager = PartsManager::default();
        manager
            .apply(DeltaEvent::tool_call(0usize, Some("f".into()), None, None))
            .unwrap();
        manager
            .apply(DeltaEvent::tool_call(0usize, None, fragment("{}"), None))
            .unwrap();

        let parts = manager.get_parts();
        let id = &parts[0].as_tool_call().unwrap().tool_call_id;
        assert!(id.starts_with("call_"));
        assert!(ToolCallId::parse(id).is_ok());
    }

    #[test]
    fn id_only_tool_call_is_hidden_until_named() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text(0usize, "before")).unwrap();

        let applied = manager
            .apply(DeltaEvent::tool_call(1usize, None, fragment(r#"{"a":"#), Some("call_9".into())))
            .unwrap();
        assert!(applied.is_new_part);
        assert!(applied.event.is_none());
        assert_eq!(manager.get_parts().len(), 1);
        assert_eq!(manager.len(), 2);

        let applied = manager
            .apply(DeltaEvent::tool_call(1usize, Some("calc".into()), fragment("1}"), None))
            .unwrap();
        assert!(matches!(
            applied.event,
            Some(ResponseStreamEvent::PartStart { index: 1, .. })
        ));

        let parts = manager.get_parts();
        let call = parts[1].as_tool_call().unwrap();
        assert_eq!(call.tool_name, "calc");
        assert_eq!(call.tool_call_id, "call_9");
        assert_eq!(call.args_as_json_str(), r#"{"a":1}"#);
    }

    #[test]
    fn mapping_strategy_overwrites_keys() {
        let mut manager = PartsManager::new(ArgsMergeStrategy::Mapping);
        manager
            .apply(DeltaEvent::tool_call(
                0usize,
                Some("f".into()),
                mapping(json!({"a": 1, "b": 2})),
                None,
            ))
            .unwrap();
        manager
            .apply(DeltaEvent::tool_call(0usize, None, mapping(json!({"b": 3})), None))
            .unwrap();

        let parts = manager.get_parts();
        let args = parts[0].as_tool_call().unwrap().args_as_map().unwrap();
        assert_eq!(args["a"], 1);
        assert_eq!(args["b"], 3);
    }

    #[test]
    fn args_shape_must_match_strategy() {
        let mut manager = PartsManager::default();
        manager
            .apply(DeltaEvent::tool_call(0usize, Some("f".into()), fragment("{"), None))
            .unwrap();
        let before = manager.get_parts();

        let error = manager
            .apply(DeltaEvent::tool_call(0usize, None, mapping(json!({"a": 1})), None))
            .unwrap_err();

        assert!(matches!(
            error.kind,
            crate::error::PartsErrorKind::ArgsStrategyMismatch { expected: "json-fragments", .. }
        ));
        assert_eq!(manager.get_parts(), before);
    }

    #[test]
    fn part_start_resets_slot_in_place() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text(0usize, "old")).unwrap();
        manager.apply(DeltaEvent::text(1usize, "second")).unwrap();

        let applied = manager
            .apply(DeltaEvent::part_start(0usize, TextPart::new("new")))
            .unwrap();
        assert!(!applied.is_new_part);
        assert_eq!(applied.part_index, 0);

        manager.apply(DeltaEvent::text(0usize, "er")).unwrap();
        let parts = manager.get_parts();
        assert_eq!(parts[0].as_text(), Some("newer"));
        assert_eq!(parts[1].as_text(), Some("second"));
    }

    #[test]
    fn part_start_may_change_kind() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text(0usize, "text")).unwrap();
        manager
            .apply(DeltaEvent::part_start(
                0usize,
                ToolCallPart::new("f", ToolCallArgs::default(), ""),
            ))
            .unwrap();

        let parts = manager.get_parts();
        let call = parts[0].as_tool_call().unwrap();
        assert!(!call.tool_call_id.is_empty());
    }

    #[test]
    fn thinking_appends_content_and_overwrites_signature() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::thinking(0usize, "Let me ")).unwrap();
        manager.apply(DeltaEvent::thinking(0usize, "think")).unwrap();
        manager
            .apply(DeltaEvent::ThinkingPartDelta {
                vendor_id: VendorPartId::from(0usize),
                content_delta: None,
                signature_delta: Some("sig-1".into()),
            })
            .unwrap();
        manager
            .apply(DeltaEvent::ThinkingPartDelta {
                vendor_id: VendorPartId::from(0usize),
                content_delta: None,
                signature_delta: Some("sig-2".into()),
            })
            .unwrap();

        match &manager.get_parts()[0] {
            Part::Thinking(thinking) => {
                assert_eq!(thinking.content, "Let me think");
                assert_eq!(thinking.signature.as_deref(), Some("sig-2"));
            }
            other => panic!("expected thinking part, got {other:?}"),
        }
    }

    #[test]
    fn thinking_on_text_conflicts() {
        let mut manager = PartsManager::default();
        manager.apply(DeltaEvent::text(0usize, "a")).unwrap();
        let error = manager.apply(DeltaEvent::thinking(0usize, "b")).unwrap_err();
        assert!(error.is_conflicting_part_kind());
    }
}
