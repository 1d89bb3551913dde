//! Connection compatibility rules.
//!
//! The [`ConnectionChecker`] trait is the seam embedders replace to change
//! which blocks may connect; [`TypeChecker`] is the stock implementation.

use kumiki_types::ConnectionType;

use crate::connection::ConnectionRef;
use crate::workspace::Workspace;

/// Outcome of a compatibility check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionCheck {
    CanConnect,
    SelfConnection,
    WrongType,
    TargetNull,
    ChecksFailed,
    ShadowParent,
    DragChecksFailed,
    PreviousAndOutput,
}

impl ConnectionCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectionCheck::CanConnect)
    }
}

/// Decides whether two connections may be joined.
pub trait ConnectionChecker: Send + Sync {
    /// Why `a` and `b` can or cannot connect.
    fn can_connect_with_reason(
        &self,
        workspace: &Workspace,
        a: &ConnectionRef,
        b: &ConnectionRef,
        is_dragging: bool,
    ) -> ConnectionCheck;

    /// Developer-facing message for a failed check.
    fn error_message(
        &self,
        workspace: &Workspace,
        code: ConnectionCheck,
        a: &ConnectionRef,
        b: &ConnectionRef,
    ) -> String;

    fn can_connect(&self, workspace: &Workspace, a: &ConnectionRef, b: &ConnectionRef, is_dragging: bool) -> bool {
        self.can_connect_with_reason(workspace, a, b, is_dragging).is_ok()
    }
}

/// Safety rules plus check-list intersection.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeChecker;

impl TypeChecker {
    fn safety_checks(&self, ws: &Workspace, a: &ConnectionRef, b: &ConnectionRef) -> ConnectionCheck {
        let (Ok(conn_a), Ok(conn_b)) = (ws.connection(a), ws.connection(b)) else {
            return ConnectionCheck::TargetNull;
        };
        let (superior, inferior, inferior_ref) = if conn_a.is_superior() {
            (a, conn_b, b)
        } else {
            (b, conn_a, a)
        };
        let superior_kind = if conn_a.is_superior() { conn_a.kind() } else { conn_b.kind() };

        if superior.block == inferior_ref.block {
            return ConnectionCheck::SelfConnection;
        }
        if inferior.kind() != superior_kind.opposite() {
            return ConnectionCheck::WrongType;
        }
        let (Some(superior_block), Some(inferior_block)) = (ws.block(&superior.block), ws.block(&inferior_ref.block))
        else {
            return ConnectionCheck::TargetNull;
        };
        if superior_block.is_shadow() && !inferior_block.is_shadow() {
            return ConnectionCheck::ShadowParent;
        }
        let other_connected = match inferior.kind() {
            ConnectionType::OutputValue => inferior_block.previous_connection().is_some_and(|c| c.is_connected()),
            ConnectionType::PreviousStatement => inferior_block.output_connection().is_some_and(|c| c.is_connected()),
            _ => false,
        };
        if other_connected {
            return ConnectionCheck::PreviousAndOutput;
        }
        ConnectionCheck::CanConnect
    }

    fn type_checks(&self, ws: &Workspace, a: &ConnectionRef, b: &ConnectionRef) -> bool {
        let (Ok(conn_a), Ok(conn_b)) = (ws.connection(a), ws.connection(b)) else {
            return false;
        };
        match (conn_a.check(), conn_b.check()) {
            (Some(one), Some(two)) => one.iter().any(|t| two.contains(t)),
            _ => true,
        }
    }

    /// Rules that only apply while a user drags `a` towards `b`.
    fn drag_checks(&self, ws: &Workspace, a: &ConnectionRef, b: &ConnectionRef) -> bool {
        let (Ok(conn_a), Ok(conn_b)) = (ws.connection(a), ws.connection(b)) else {
            return false;
        };
        if ws.block(&b.block).is_some_and(|blk| blk.is_insertion_marker()) {
            return false;
        }
        let target = conn_b.target_block().and_then(|id| ws.block(id));
        match conn_b.kind() {
            ConnectionType::PreviousStatement => {
                if conn_a.is_connected() {
                    return false;
                }
                match target {
                    None => true,
                    Some(t) if t.is_insertion_marker() => t.parent_block().is_none(),
                    Some(_) => false,
                }
            }
            ConnectionType::OutputValue => {
                let occupied = target.is_some_and(|t| !t.is_insertion_marker());
                !(occupied || conn_a.is_connected())
            }
            ConnectionType::InputValue => {
                !target.is_some_and(|t| !t.is_movable() && !t.is_shadow())
            }
            ConnectionType::NextStatement => {
                let dragged_has_next = ws
                    .block(&a.block)
                    .is_some_and(|blk| blk.next_connection().is_some());
                !target.is_some_and(|t| !dragged_has_next && !t.is_shadow() && t.next_connection().is_some())
            }
        }
    }
}

impl ConnectionChecker for TypeChecker {
    fn can_connect_with_reason(
        &self,
        workspace: &Workspace,
        a: &ConnectionRef,
        b: &ConnectionRef,
        is_dragging: bool,
    ) -> ConnectionCheck {
        let safety = self.safety_checks(workspace, a, b);
        if !safety.is_ok() {
            return safety;
        }
        if !self.type_checks(workspace, a, b) {
            return ConnectionCheck::ChecksFailed;
        }
        if is_dragging && !self.drag_checks(workspace, a, b) {
            return ConnectionCheck::DragChecksFailed;
        }
        ConnectionCheck::CanConnect
    }

    fn error_message(
        &self,
        workspace: &Workspace,
        code: ConnectionCheck,
        a: &ConnectionRef,
        b: &ConnectionRef,
    ) -> String {
        match code {
            ConnectionCheck::SelfConnection => "Attempted to connect a block to itself.".to_string(),
            ConnectionCheck::WrongType => "Attempt to connect incompatible types.".to_string(),
            ConnectionCheck::TargetNull => "Target connection is null.".to_string(),
            ConnectionCheck::ChecksFailed => {
                let check_of = |at: &ConnectionRef| {
                    workspace
                        .connection(at)
                        .map(|c| c.check_label())
                        .unwrap_or_else(|_| "null".to_string())
                };
                format!(
                    "Connection checks failed. {} expected {}, found {}",
                    workspace.describe_connection(a),
                    check_of(a),
                    check_of(b)
                )
            }
            ConnectionCheck::ShadowParent => "Connecting non-shadow to shadow block.".to_string(),
            ConnectionCheck::DragChecksFailed => "Drag checks failed.".to_string(),
            ConnectionCheck::PreviousAndOutput => "Block would have an output and a previous connection.".to_string(),
            ConnectionCheck::CanConnect => "Unknown connection failure: this should never happen!".to_string(),
        }
    }
}
