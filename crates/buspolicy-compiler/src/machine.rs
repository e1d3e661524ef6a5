//! Schema state machine for the busconfig dialect.
//!
//! One explicit state value, one token at a time, no backtracking. Unknown
//! top-level subtrees are skipped with a depth counter instead of recursion,
//! so arbitrarily deep foreign content costs no stack.
//!
//! Completed rules go straight into the shared [`PolicyStore`] as their
//! closing tag is consumed. A failure part-way through a fragment leaves the
//! rules already emitted in place.

use buspolicy_core::{IdentityResolver, Token, TokenKind, TokenSource};
use std::mem;

use crate::error::{CompileError, CompileResult};
use crate::rule::{Disposition, MessageType, RuleBuildError, RuleBuilder, RuleClass, RuleField};
use crate::store::{Category, PolicyStore};

/// A tolerated oddity in a fragment: logged and compilation continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileWarning {
    pub line: u32,
    pub message: String,
}

/// What one successful compilation pass contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
    pub rules_added: usize,
    /// Rules that validated but sat in a `<policy>` block with no category.
    pub discarded_rules: usize,
    pub warnings: Vec<CompileWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PolicyAttribute {
    Context,
    User,
    Group,
}

/// Where an attribute value inside `<allow>`/`<deny>` is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueSlot {
    Field(RuleField),
    MessageType,
    AssumedUser,
    AssumedGroup,
}

#[derive(Debug)]
enum State {
    Outside,
    Busconfig,
    Policy,
    PolicyValue(PolicyAttribute),
    PolicyIgnoredValue,
    Rule(RuleBuilder),
    RuleValue(RuleBuilder, ValueSlot),
    RuleIgnoredValue(RuleBuilder),
    Foreign { depth: u32 },
    Accepted,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Outside => "document prolog",
            State::Busconfig => "<busconfig>",
            State::Policy => "<policy>",
            State::PolicyValue(_) | State::PolicyIgnoredValue => "<policy> attribute",
            State::Rule(builder) => match builder.disposition() {
                Disposition::Allow => "<allow>",
                Disposition::Deny => "<deny>",
            },
            State::RuleValue(..) | State::RuleIgnoredValue(_) => "rule attribute",
            State::Foreign { .. } => "skipped element",
            State::Accepted => "end of document",
        }
    }
}

/// Compiles one fragment's token stream into a shared store.
pub struct Compiler<'a> {
    store: &'a mut PolicyStore,
    resolver: &'a dyn IdentityResolver,
    origin: &'a str,
    state: State,
    category: Option<Category>,
    outcome: CompileOutcome,
}

impl<'a> Compiler<'a> {
    /// `origin` names the fragment in log output (usually its path).
    pub fn new(
        store: &'a mut PolicyStore,
        resolver: &'a dyn IdentityResolver,
        origin: &'a str,
    ) -> Self {
        Self {
            store,
            resolver,
            origin,
            state: State::Outside,
            category: None,
            outcome: CompileOutcome::default(),
        }
    }

    /// Pull tokens until the document is accepted or a fatal error occurs.
    pub fn run(mut self, source: &mut dyn TokenSource) -> CompileResult<CompileOutcome> {
        let mut line = 1;
        while !matches!(self.state, State::Accepted) {
            let token = source
                .next_token()
                .map_err(|e| CompileError::from_source(e, line))?;
            line = token.line;
            self.step(token)?;
        }
        tracing::debug!(
            origin = self.origin,
            rules = self.outcome.rules_added,
            discarded = self.outcome.discarded_rules,
            "fragment compiled"
        );
        Ok(self.outcome)
    }

    fn step(&mut self, token: Token) -> CompileResult<()> {
        let Token { kind, line } = token;
        let state = mem::replace(&mut self.state, State::Accepted);
        self.state = match state {
            State::Outside => self.outside(kind, line)?,
            State::Busconfig => self.busconfig(kind, line)?,
            State::Policy => self.policy(kind, line)?,
            State::PolicyValue(attribute) => self.policy_value(attribute, kind, line)?,
            State::PolicyIgnoredValue => match kind {
                TokenKind::AttributeValue(_) => State::Policy,
                other => return Err(unexpected(&State::PolicyIgnoredValue, other, line)),
            },
            State::Rule(builder) => self.rule(builder, kind, line)?,
            State::RuleValue(builder, slot) => self.rule_value(builder, slot, kind, line)?,
            State::RuleIgnoredValue(builder) => match kind {
                TokenKind::AttributeValue(_) => State::Rule(builder),
                other => {
                    return Err(unexpected(&State::RuleIgnoredValue(builder), other, line))
                }
            },
            State::Foreign { depth } => foreign(depth, kind, line)?,
            State::Accepted => State::Accepted,
        };
        Ok(())
    }

    fn outside(&mut self, kind: TokenKind, line: u32) -> CompileResult<State> {
        match kind {
            TokenKind::TagOpen(name) if name == "busconfig" => Ok(State::Busconfig),
            TokenKind::TagOpen(tag) => Err(CompileError::UnexpectedTag { line, tag }),
            TokenKind::End => Ok(State::Accepted),
            other if other.is_blank_text() => Ok(State::Outside),
            other => Err(unexpected(&State::Outside, other, line)),
        }
    }

    fn busconfig(&mut self, kind: TokenKind, line: u32) -> CompileResult<State> {
        match kind {
            TokenKind::TagOpen(name) if name == "policy" => {
                self.category = None;
                Ok(State::Policy)
            }
            TokenKind::TagOpen(_) => Ok(State::Foreign { depth: 0 }),
            TokenKind::TagCloseEmpty(_) => Ok(State::Outside),
            TokenKind::TagClose(name) if name == "busconfig" => Ok(State::Outside),
            TokenKind::End => Err(CompileError::UnexpectedEnd { line }),
            other if other.is_blank_text() => Ok(State::Busconfig),
            other => Err(unexpected(&State::Busconfig, other, line)),
        }
    }

    fn policy(&mut self, kind: TokenKind, line: u32) -> CompileResult<State> {
        match kind {
            TokenKind::AttributeName(name) => Ok(match name.as_str() {
                "context" => State::PolicyValue(PolicyAttribute::Context),
                "user" => State::PolicyValue(PolicyAttribute::User),
                "group" => State::PolicyValue(PolicyAttribute::Group),
                _ => {
                    self.warn(
                        line,
                        format!("attribute {} of <policy> tag unknown, ignoring", name),
                    );
                    State::PolicyIgnoredValue
                }
            }),
            TokenKind::TagCloseEmpty(_) => Ok(State::Busconfig),
            TokenKind::TagClose(name) if name == "policy" => Ok(State::Busconfig),
            TokenKind::TagOpen(tag) => match Disposition::from_element(&tag) {
                Some(disposition) => Ok(State::Rule(RuleBuilder::new(disposition))),
                None => Err(CompileError::UnknownPolicyElement { line, tag }),
            },
            TokenKind::End => Err(CompileError::UnexpectedEnd { line }),
            other if other.is_blank_text() => Ok(State::Policy),
            other => Err(unexpected(&State::Policy, other, line)),
        }
    }

    fn policy_value(
        &mut self,
        attribute: PolicyAttribute,
        kind: TokenKind,
        line: u32,
    ) -> CompileResult<State> {
        let value = match kind {
            TokenKind::AttributeValue(value) => value,
            other => return Err(unexpected(&State::PolicyValue(attribute), other, line)),
        };

        let category = match attribute {
            PolicyAttribute::Context => match value.as_str() {
                "default" => Category::Default,
                "mandatory" => Category::Mandatory,
                _ => return Err(CompileError::InvalidContext { line, value }),
            },
            PolicyAttribute::User => Category::User(
                self.resolver
                    .resolve_user(&value)
                    .map_err(|source| CompileError::Identity { line, source })?,
            ),
            PolicyAttribute::Group => Category::Group(
                self.resolver
                    .resolve_group(&value)
                    .map_err(|source| CompileError::Identity { line, source })?,
            ),
        };
        self.category = Some(category);
        Ok(State::Policy)
    }

    fn rule(&mut self, mut builder: RuleBuilder, kind: TokenKind, line: u32) -> CompileResult<State> {
        match kind {
            TokenKind::AttributeName(name) => {
                let Some((class, suffix)) = classify(&name) else {
                    self.warn(line, format!("unknown attribute {}=, ignoring", name));
                    return Ok(State::RuleIgnoredValue(builder));
                };

                builder
                    .assign_class(class)
                    .map_err(|e| build_error(e, line))?;

                match value_slot(class, suffix) {
                    Some(slot) => Ok(State::RuleValue(builder, slot)),
                    None => {
                        self.warn(line, format!("unknown attribute {}=, ignoring", name));
                        Ok(State::RuleIgnoredValue(builder))
                    }
                }
            }
            TokenKind::TagCloseEmpty(_) => self.close_rule(builder, line),
            TokenKind::TagClose(name) => {
                let expected = builder.disposition().element_name();
                if name != expected {
                    return Err(CompileError::MismatchedClose {
                        line,
                        expected,
                        found: name,
                    });
                }
                self.close_rule(builder, line)
            }
            TokenKind::End => Err(CompileError::UnexpectedEnd { line }),
            other if other.is_blank_text() => Ok(State::Rule(builder)),
            other => Err(unexpected(&State::Rule(builder), other, line)),
        }
    }

    fn rule_value(
        &mut self,
        mut builder: RuleBuilder,
        slot: ValueSlot,
        kind: TokenKind,
        line: u32,
    ) -> CompileResult<State> {
        let value = match kind {
            TokenKind::AttributeValue(value) => value,
            other => return Err(unexpected(&State::RuleValue(builder, slot), other, line)),
        };

        match slot {
            ValueSlot::Field(field) => builder
                .set_text(field, value)
                .map_err(|e| build_error(e, line))?,
            ValueSlot::MessageType => {
                if builder.has_message_type() {
                    return Err(CompileError::DuplicateAttribute {
                        line,
                        field: RuleField::MessageType,
                    });
                }
                let message_type = MessageType::from_name(&value)
                    .ok_or(CompileError::InvalidMessageType { line, value })?;
                builder
                    .set_message_type(message_type)
                    .map_err(|e| build_error(e, line))?;
            }
            ValueSlot::AssumedUser => {
                let uid = if value == "*" {
                    None
                } else {
                    Some(
                        self.resolver
                            .resolve_user(&value)
                            .map_err(|source| CompileError::Identity { line, source })?,
                    )
                };
                builder
                    .set_text(RuleField::Name, value)
                    .map_err(|e| build_error(e, line))?;
                if let Some(uid) = uid {
                    builder.set_principal_uid(uid);
                }
            }
            ValueSlot::AssumedGroup => {
                let gid = if value == "*" {
                    None
                } else {
                    Some(
                        self.resolver
                            .resolve_group(&value)
                            .map_err(|source| CompileError::Identity { line, source })?,
                    )
                };
                builder
                    .set_text(RuleField::Name, value)
                    .map_err(|e| build_error(e, line))?;
                if let Some(gid) = gid {
                    builder.set_principal_gid(gid);
                }
            }
        }
        Ok(State::Rule(builder))
    }

    fn close_rule(&mut self, builder: RuleBuilder, line: u32) -> CompileResult<State> {
        let rule = builder.finish().ok_or(CompileError::ClassNotSet { line })?;
        match self.category {
            Some(category) => {
                self.store.insert(category, rule);
                self.outcome.rules_added += 1;
            }
            None => {
                self.warn(
                    line,
                    format!(
                        "<{}> in <policy> without context, user or group, discarding",
                        rule.disposition()
                    ),
                );
                self.outcome.discarded_rules += 1;
            }
        }
        Ok(State::Policy)
    }

    fn warn(&mut self, line: u32, message: String) {
        tracing::warn!("{} at {}:{}", message, self.origin, line);
        self.outcome.warnings.push(CompileWarning { line, message });
    }
}

/// Skip an unknown subtree. `depth` counts elements opened inside it.
fn foreign(depth: u32, kind: TokenKind, line: u32) -> CompileResult<State> {
    match kind {
        TokenKind::TagOpen(_) => Ok(State::Foreign { depth: depth + 1 }),
        TokenKind::TagClose(_) | TokenKind::TagCloseEmpty(_) => Ok(match depth {
            0 => State::Busconfig,
            n => State::Foreign { depth: n - 1 },
        }),
        TokenKind::End => Err(CompileError::UnexpectedEnd { line }),
        _ => Ok(State::Foreign { depth }),
    }
}

/// Derive the rule class from an attribute name, with the remaining suffix
/// for `send_*` / `receive_*`.
fn classify(name: &str) -> Option<(RuleClass, &str)> {
    if let Some(suffix) = name.strip_prefix("send_") {
        return Some((RuleClass::Send, suffix));
    }
    if let Some(suffix) = name.strip_prefix("receive_") {
        return Some((RuleClass::Receive, suffix));
    }
    match name {
        "own" => Some((RuleClass::Own, "")),
        "own_prefix" => Some((RuleClass::OwnPrefix, "")),
        "user" => Some((RuleClass::AssumeUser, "")),
        "group" => Some((RuleClass::AssumeGroup, "")),
        _ => None,
    }
}

fn value_slot(class: RuleClass, suffix: &str) -> Option<ValueSlot> {
    match class {
        RuleClass::Send | RuleClass::Receive => match suffix {
            "interface" => Some(ValueSlot::Field(RuleField::Interface)),
            "member" => Some(ValueSlot::Field(RuleField::Member)),
            "error" => Some(ValueSlot::Field(RuleField::Error)),
            "path" => Some(ValueSlot::Field(RuleField::Path)),
            "type" => Some(ValueSlot::MessageType),
            "destination" if class == RuleClass::Send => Some(ValueSlot::Field(RuleField::Name)),
            "sender" if class == RuleClass::Receive => Some(ValueSlot::Field(RuleField::Name)),
            _ => None,
        },
        RuleClass::Own | RuleClass::OwnPrefix => Some(ValueSlot::Field(RuleField::Name)),
        RuleClass::AssumeUser => Some(ValueSlot::AssumedUser),
        RuleClass::AssumeGroup => Some(ValueSlot::AssumedGroup),
    }
}

fn build_error(err: RuleBuildError, line: u32) -> CompileError {
    match err {
        RuleBuildError::Duplicate(field) => CompileError::DuplicateAttribute { line, field },
        RuleBuildError::ClassMismatch {
            existing,
            requested,
        } => CompileError::ClassMismatch {
            line,
            existing,
            requested,
        },
    }
}

fn unexpected(state: &State, kind: TokenKind, line: u32) -> CompileError {
    if kind == TokenKind::End {
        return CompileError::UnexpectedEnd { line };
    }
    CompileError::UnexpectedToken {
        line,
        state: state.name(),
        found: kind.to_string(),
    }
}

/// Compile one token stream into `store`.
pub fn compile(
    source: &mut dyn TokenSource,
    store: &mut PolicyStore,
    resolver: &dyn IdentityResolver,
    origin: &str,
) -> CompileResult<CompileOutcome> {
    Compiler::new(store, resolver, origin).run(source)
}
