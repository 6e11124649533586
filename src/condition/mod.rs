//! Channel conditions.
//!
//! A condition is a predicate that an actor must satisfy to use or see a
//! channel. Conditions are written in a small `;`-separated language, one
//! clause per condition:
//!
//! - `chat.staff`: bare permission node
//! - `permission:chat.staff` (alias `perm`)
//! - `world:lobby,arena`: actor is in one of the worlds
//! - `group:admin,mod`: actor is in one of the groups
//! - `player:<uuid>,<uuid>` (alias `user`): actor is one of the users
//! - a leading `!` negates any clause
//!
//! Parsing never aborts: a bad clause is logged and replaced by an
//! unsupported condition that always fails, while the remaining clauses
//! still load. A typo therefore closes a channel instead of opening it.

mod parser;

pub use parser::{parse_conditions, split_clauses, try_parse_conditions};

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::recipient::Recipient;
use crate::text::RichText;

/// Errors raised while building a condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// Clause was empty after trimming.
    #[error("empty condition clause")]
    Empty,

    /// The clause tag does not name a known condition kind.
    #[error("unsupported condition kind '{0}'")]
    Unsupported(String),

    /// The condition kind needs at least one argument.
    #[error("condition '{0}' requires an argument")]
    MissingArgument(&'static str),

    /// The condition kind takes a fixed number of arguments.
    #[error("condition '{kind}' takes exactly one argument, got {count}")]
    TooManyArguments {
        /// Condition kind.
        kind: &'static str,
        /// Number of arguments supplied.
        count: usize,
    },

    /// An argument could not be interpreted.
    #[error("condition '{kind}' has an invalid argument '{value}'")]
    InvalidArgument {
        /// Condition kind.
        kind: &'static str,
        /// Offending argument.
        value: String,
    },
}

/// Known condition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    /// Actor holds a permission node.
    Permission,
    /// Actor is in one of the listed worlds.
    World,
    /// Actor belongs to one of the listed groups.
    Group,
    /// Actor is one of the listed users.
    Player,
    /// Stands in for a clause that could not be parsed. Never passes.
    Unsupported,
}

/// Tag lookup table. Tags are matched case-insensitively.
const KIND_TAGS: &[(&str, ConditionKind)] = &[
    ("permission", ConditionKind::Permission),
    ("perm", ConditionKind::Permission),
    ("world", ConditionKind::World),
    ("group", ConditionKind::Group),
    ("player", ConditionKind::Player),
    ("user", ConditionKind::Player),
];

impl ConditionKind {
    /// Resolve a clause tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase();
        KIND_TAGS
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
    }

    /// Canonical tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Permission => "permission",
            ConditionKind::World => "world",
            ConditionKind::Group => "group",
            ConditionKind::Player => "player",
            ConditionKind::Unsupported => "unsupported",
        }
    }

    /// Check and normalize arguments for this kind.
    fn normalize_args(self, args: Vec<String>) -> Result<Vec<String>, ConditionError> {
        if self == ConditionKind::Unsupported {
            return Err(ConditionError::Unsupported(self.as_str().to_string()));
        }
        if args.is_empty() {
            return Err(ConditionError::MissingArgument(self.as_str()));
        }

        match self {
            ConditionKind::Permission if args.len() > 1 => Err(ConditionError::TooManyArguments {
                kind: self.as_str(),
                count: args.len(),
            }),
            ConditionKind::Player => args
                .into_iter()
                .map(|arg| {
                    Uuid::parse_str(&arg)
                        .map(|id| id.to_string())
                        .map_err(|_| ConditionError::InvalidArgument {
                            kind: self.as_str(),
                            value: arg,
                        })
                })
                .collect(),
            _ => Ok(args),
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a condition is evaluated against.
#[derive(Clone, Copy)]
pub struct ConditionContext<'a> {
    /// The user trying to use or receive from the channel.
    pub actor: &'a dyn Recipient,
    /// Name of the channel being checked.
    pub channel: &'a str,
    /// The message being dispatched, when there is one.
    pub message: Option<&'a RichText>,
    /// Who sent the message, when it came from a user.
    pub sender: Option<Uuid>,
}

impl<'a> ConditionContext<'a> {
    /// Context without a message.
    pub fn new(actor: &'a dyn Recipient, channel: &'a str) -> Self {
        Self {
            actor,
            channel,
            message: None,
            sender: None,
        }
    }

    /// Attach the message being dispatched.
    pub fn with_message(mut self, message: &'a RichText) -> Self {
        self.message = Some(message);
        self
    }

    /// Attach the sender of the message.
    pub fn with_sender(mut self, sender: Uuid) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// A single parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    kind: ConditionKind,
    args: Vec<String>,
    negated: bool,
}

impl Condition {
    /// Build a condition, validating its arguments.
    pub fn new(kind: ConditionKind, args: Vec<String>) -> Result<Self, ConditionError> {
        let args = kind.normalize_args(args)?;
        Ok(Self {
            kind,
            args,
            negated: false,
        })
    }

    /// A permission-node condition.
    pub fn permission(node: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Permission,
            args: vec![node.into()],
            negated: false,
        }
    }

    /// A condition standing in for a clause that failed to parse.
    ///
    /// It keeps the raw clause for display and denies every actor, even
    /// when negated.
    pub fn unsupported(clause: impl Into<String>) -> Self {
        Self {
            kind: ConditionKind::Unsupported,
            args: vec![clause.into()],
            negated: false,
        }
    }

    /// Whether this condition stands in for an unparsable clause.
    pub fn is_unsupported(&self) -> bool {
        self.kind == ConditionKind::Unsupported
    }

    /// Invert this condition.
    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// Parse one clause of the condition language.
    pub fn of(raw: &str) -> Result<Self, ConditionError> {
        parser::parse_clause(raw)
    }

    /// The condition kind.
    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    /// Normalized arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the result is inverted.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Evaluate against an actor. Pure; safe to call from any thread.
    pub fn test(&self, ctx: &ConditionContext<'_>) -> bool {
        if self.is_unsupported() {
            return false;
        }
        let actor = ctx.actor;
        let matched = match self.kind {
            ConditionKind::Permission => self.args.iter().all(|node| actor.has_permission(node)),
            ConditionKind::World => actor.world().is_some_and(|world| {
                self.args.iter().any(|w| w.eq_ignore_ascii_case(&world))
            }),
            ConditionKind::Group => {
                let groups = actor.groups();
                self.args
                    .iter()
                    .any(|g| groups.iter().any(|have| have.eq_ignore_ascii_case(g)))
            }
            ConditionKind::Player => {
                let id = actor.id().to_string();
                self.args.iter().any(|p| *p == id)
            }
            ConditionKind::Unsupported => false,
        };
        matched != self.negated
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}:{}", self.kind, self.args.join(","))
    }
}

/// True when every condition passes. An empty list always passes.
pub fn all_pass(conditions: &[Condition], ctx: &ConditionContext<'_>) -> bool {
    conditions.iter().all(|c| c.test(ctx))
}
