//! Call Signaling Relay
//!
//! Tracks ephemeral call sessions and relays WebRTC signaling between their
//! participants. Media never passes through here; offers, answers and ICE
//! candidates are forwarded verbatim to one target connection.
//!
//! Every session mutation happens under the session's map entry lock. Call
//! room membership is changed inside the same critical section, so a session
//! and its room never disagree about who is in the call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use uuid::Uuid;

use super::connection::Connection;
use super::detach;
use super::events::{self, OutboundEvent};
use super::payloads::{CallStartPayload, SignalPayload};
use super::registry::ConnectionRegistry;
use super::rooms::{RoomKey, RoomManager};
use crate::domain::{
    CallId, CallOutcome, CallState, CallSummary, ConnectionId, ConversationId,
    ConversationRepository, MessageRepository, NewMessage, UserId,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

struct CallSession {
    call_id: CallId,
    conversation_id: Option<ConversationId>,
    initiator: UserId,
    is_video: bool,
    is_group: bool,
    state: CallState,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    /// Callee of a 1:1 call that has not answered yet
    ringing: Option<UserId>,
    /// In join order
    participants: Vec<Arc<Connection>>,
}

impl CallSession {
    fn new(
        call_id: CallId,
        conversation_id: Option<ConversationId>,
        initiator: &Arc<Connection>,
        is_video: bool,
        is_group: bool,
    ) -> Self {
        Self {
            call_id,
            conversation_id,
            initiator: initiator.user_id(),
            is_video,
            is_group,
            state: CallState::Idle,
            started_at: Utc::now(),
            answered_at: None,
            ringing: None,
            participants: vec![Arc::clone(initiator)],
        }
    }

    fn advance(&mut self, next: CallState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            tracing::warn!(
                call_id = %self.call_id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Ignoring illegal call state transition"
            );
        }
    }

    fn has_participant(&self, connection_id: ConnectionId) -> bool {
        self.participants.iter().any(|c| c.id() == connection_id)
    }

    fn participant(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        self.participants
            .iter()
            .find(|c| c.id() == connection_id)
            .cloned()
    }

    fn remove_participant(&mut self, connection_id: ConnectionId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|c| c.id() != connection_id);
        self.participants.len() != before
    }

    /// Whether `user_id` is a party to this 1:1 call.
    fn admits(&self, user_id: UserId) -> bool {
        self.initiator == user_id
            || self.ringing == Some(user_id)
            || self.participants.iter().any(|c| c.user_id() == user_id)
    }

    fn summary(&self, outcome: CallOutcome, duration_secs: i64) -> CallSummary {
        CallSummary {
            outcome,
            is_video: self.is_video,
            is_group: self.is_group,
            duration_secs,
        }
    }

    /// Outcome of a session finalized now: missed if nobody ever answered.
    fn final_summary(&self, now: DateTime<Utc>) -> CallSummary {
        match self.answered_at {
            Some(answered_at) => {
                self.summary(CallOutcome::Ended, (now - answered_at).num_seconds().max(0))
            }
            None => self.summary(CallOutcome::Missed, 0),
        }
    }
}

/// History entry owed by a call that just left the session table.
struct FinishedCall {
    conversation_id: Option<ConversationId>,
    initiator: UserId,
    summary: CallSummary,
}

pub struct CallRelay {
    sessions: DashMap<CallId, CallSession>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl CallRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomManager>,
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            registry,
            rooms,
            conversations,
            messages,
        }
    }

    /// `call:start`
    pub async fn start(
        &self,
        caller: &Arc<Connection>,
        request: CallStartPayload,
    ) -> Result<(), AppError> {
        if request.is_group {
            self.start_group(caller, request).await
        } else {
            self.start_direct(caller, request).await
        }
    }

    async fn start_group(
        &self,
        caller: &Arc<Connection>,
        request: CallStartPayload,
    ) -> Result<(), AppError> {
        let call_id = request
            .call_id
            .clone()
            .or_else(|| request.conversation_id.map(|id| id.to_string()))
            .ok_or_else(|| AppError::Validation("callId or conversationId is required".into()))?;

        let participants = match request.conversation_id {
            Some(conversation_id) => self.participants_of(conversation_id, caller).await?,
            None => Vec::new(),
        };

        let created = match self.sessions.entry(call_id.clone()) {
            // A second start for a live group call is a join.
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let mut session = CallSession::new(
                    call_id.clone(),
                    request.conversation_id,
                    caller,
                    request.is_video,
                    true,
                );
                session.advance(CallState::Active);
                self.rooms.join(caller, RoomKey::Call(call_id.clone()));
                slot.insert(session);
                true
            }
        };

        if !created {
            return self.join(caller, &call_id, request.is_video).await;
        }
        self.update_gauge();

        let incoming = Arc::new(OutboundEvent::new(
            events::CALL_INCOMING,
            incoming_payload(&call_id, caller, &request),
        ));
        let mut rung = 0;
        for user_id in participants.into_iter().filter(|u| *u != caller.user_id()) {
            for conn in self.registry.get_connections(user_id) {
                if conn.deliver(Arc::clone(&incoming)) {
                    rung += 1;
                }
            }
        }

        self.record_history(FinishedCall {
            conversation_id: request.conversation_id,
            initiator: caller.user_id(),
            summary: CallSummary {
                outcome: CallOutcome::Started,
                is_video: request.is_video,
                is_group: true,
                duration_secs: 0,
            },
        });

        tracing::info!(
            call_id = %call_id,
            caller = %caller.user_id(),
            connections_rung = rung,
            "Group call started"
        );
        Ok(())
    }

    async fn start_direct(
        &self,
        caller: &Arc<Connection>,
        request: CallStartPayload,
    ) -> Result<(), AppError> {
        let caller_id = caller.user_id();

        let target = match request.conversation_id {
            Some(conversation_id) => {
                let participants = self.participants_of(conversation_id, caller).await?;
                match request.target_user_id {
                    Some(target) if participants.contains(&target) => target,
                    Some(_) => {
                        return Err(AppError::Validation(
                            "target is not a participant of this conversation".into(),
                        ))
                    }
                    None => participants
                        .into_iter()
                        .find(|u| *u != caller_id)
                        .ok_or_else(|| {
                            AppError::Validation("conversation has no one to call".into())
                        })?,
                }
            }
            None => request
                .target_user_id
                .ok_or_else(|| AppError::Validation("targetUserId is required".into()))?,
        };

        if target == caller_id {
            return Err(AppError::Validation("cannot call yourself".into()));
        }

        let call_id = request
            .call_id
            .clone()
            .or_else(|| request.conversation_id.map(|id| id.to_string()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let target_connections = self.registry.get_connections(target);
        if target_connections.is_empty() {
            self.record_history(FinishedCall {
                conversation_id: request.conversation_id,
                initiator: caller_id,
                summary: CallSummary {
                    outcome: CallOutcome::Missed,
                    is_video: request.is_video,
                    is_group: false,
                    duration_secs: 0,
                },
            });
            caller.emit(
                events::CALL_UNAVAILABLE,
                json!({
                    "callId": call_id,
                    "targetUserId": target,
                    "reason": "offline",
                }),
            );
            tracing::info!(call_id = %call_id, caller = %caller_id, target = %target, "Callee offline");
            return Ok(());
        }

        match self.sessions.entry(call_id.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Validation(format!(
                    "call {} is already in progress",
                    call_id
                )))
            }
            Entry::Vacant(slot) => {
                let mut session = CallSession::new(
                    call_id.clone(),
                    request.conversation_id,
                    caller,
                    request.is_video,
                    false,
                );
                session.ringing = Some(target);
                session.advance(CallState::Ringing);
                self.rooms.join(caller, RoomKey::Call(call_id.clone()));
                slot.insert(session);
            }
        }
        self.update_gauge();

        let incoming = Arc::new(OutboundEvent::new(
            events::CALL_INCOMING,
            incoming_payload(&call_id, caller, &request),
        ));
        for conn in &target_connections {
            conn.deliver(Arc::clone(&incoming));
        }

        tracing::info!(
            call_id = %call_id,
            caller = %caller_id,
            target = %target,
            devices = target_connections.len(),
            "Call ringing"
        );
        Ok(())
    }

    /// `call:join`. Creates a group session when none exists.
    ///
    /// A call bound to a conversation only admits that conversation's
    /// participants. Only participants already in the call hear about the
    /// joiner.
    pub async fn join(
        &self,
        conn: &Arc<Connection>,
        call_id: &CallId,
        is_video: bool,
    ) -> Result<(), AppError> {
        let scope = self.conversation_scope(conn, call_id).await?;
        let key = RoomKey::Call(call_id.clone());

        match self.sessions.entry(call_id.clone()) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                if session.has_participant(conn.id()) {
                    return Ok(());
                }
                // Bound to a conversation after the scope lookup ran.
                if session.conversation_id.is_some() && session.conversation_id != scope {
                    return Err(AppError::Forbidden("not a participant of this call".into()));
                }
                if !session.is_group && !session.admits(conn.user_id()) {
                    return Err(AppError::Forbidden("not a party to this call".into()));
                }

                self.rooms.broadcast(
                    &key,
                    events::CALL_PARTICIPANT_JOINED,
                    json!({
                        "callId": call_id,
                        "connectionId": conn.id(),
                        "userId": conn.user_id(),
                        "user": conn.identity(),
                    }),
                    None,
                );
                session.participants.push(Arc::clone(conn));
                self.rooms.join(conn, key);

                if session.answered_at.is_none() && conn.user_id() != session.initiator {
                    session.answered_at = Some(Utc::now());
                }
                if session.state == CallState::Ringing {
                    session.advance(CallState::Active);
                    if let Some(target) = session.ringing.take() {
                        self.stop_ringing(target, call_id, conn.id(), "answered_elsewhere");
                    }
                }
                tracing::info!(call_id = %call_id, user_id = %conn.user_id(), "Joined call");
            }
            Entry::Vacant(slot) => {
                let mut session = CallSession::new(call_id.clone(), scope, conn, is_video, true);
                session.advance(CallState::Active);
                self.rooms.join(conn, key);
                slot.insert(session);
                tracing::info!(call_id = %call_id, user_id = %conn.user_id(), "Group call created by join");
            }
        }

        self.update_gauge();
        Ok(())
    }

    /// `call:offer`, `call:answer`, `call:ice-candidate`
    ///
    /// Both ends must be participants of the call. Anything else, including a
    /// target that has since disconnected, is `TargetNotFound`.
    pub fn relay_signal(
        &self,
        from: &Connection,
        event: &str,
        signal: SignalPayload,
    ) -> Result<(), AppError> {
        let target = {
            let session = self
                .sessions
                .get(&signal.call_id)
                .ok_or_else(|| AppError::TargetNotFound(signal.call_id.clone()))?;
            if !session.has_participant(from.id()) {
                return Err(AppError::TargetNotFound(signal.call_id.clone()));
            }
            session
                .participant(signal.target_connection_id)
                .ok_or_else(|| AppError::TargetNotFound(signal.target_connection_id.to_string()))?
        };

        let delivered = target.emit(
            event,
            json!({
                "callId": signal.call_id,
                "fromConnectionId": from.id(),
                "fromUserId": from.user_id(),
                "payload": signal.payload,
            }),
        );
        if delivered {
            Ok(())
        } else {
            Err(AppError::TargetNotFound(signal.target_connection_id.to_string()))
        }
    }

    /// `call:leave`. Idempotent.
    ///
    /// A 1:1 session ends as soon as either side leaves; a group session ends
    /// when its last participant leaves.
    pub fn leave(&self, conn: &Connection, call_id: &CallId) {
        let key = RoomKey::Call(call_id.clone());

        let finished = match self.sessions.entry(call_id.clone()) {
            Entry::Vacant(_) => {
                self.rooms.leave(conn, &key);
                return;
            }
            Entry::Occupied(mut entry) => {
                if !entry.get_mut().remove_participant(conn.id()) {
                    self.rooms.leave(conn, &key);
                    return;
                }
                self.rooms.leave(conn, &key);
                self.rooms.broadcast(
                    &key,
                    events::CALL_PARTICIPANT_LEFT,
                    json!({
                        "callId": call_id,
                        "connectionId": conn.id(),
                        "userId": conn.user_id(),
                    }),
                    None,
                );

                let session = entry.get();
                if session.is_group && !session.participants.is_empty() {
                    None
                } else {
                    Some(self.finalize(entry.remove(), conn.user_id(), None))
                }
            }
        };

        if let Some(finished) = finished {
            self.record_history(finished);
            self.update_gauge();
        }
    }

    /// `call:end`. Ends a 1:1 session for both sides.
    ///
    /// In a group call it only takes the caller out, like `call:leave`; the
    /// session ends once its last participant is gone. A callee ending a call
    /// that is still ringing declines it.
    pub fn end(&self, conn: &Connection, call_id: &CallId) -> Result<(), AppError> {
        let finished = match self.sessions.entry(call_id.clone()) {
            Entry::Vacant(_) => {
                tracing::debug!(call_id = %call_id, "End for unknown call ignored");
                return Ok(());
            }
            Entry::Occupied(entry) => {
                let session = entry.get();
                if !session.has_participant(conn.id()) {
                    let declining = session.state == CallState::Ringing
                        && session.ringing == Some(conn.user_id());
                    drop(entry);
                    if declining {
                        return self.decline(conn, call_id);
                    }
                    return Err(AppError::Forbidden("not a participant of this call".into()));
                }
                if session.is_group {
                    drop(entry);
                    self.leave(conn, call_id);
                    return Ok(());
                }
                self.finalize(entry.remove(), conn.user_id(), Some(conn.id()))
            }
        };

        self.record_history(finished);
        self.update_gauge();
        Ok(())
    }

    /// `call:decline`. Only the callee of a ringing 1:1 call may decline.
    pub fn decline(&self, conn: &Connection, call_id: &CallId) -> Result<(), AppError> {
        let finished = match self.sessions.entry(call_id.clone()) {
            Entry::Occupied(entry)
                if entry.get().state == CallState::Ringing
                    && entry.get().ringing == Some(conn.user_id()) =>
            {
                let mut session = entry.remove();
                let key = RoomKey::Call(call_id.clone());
                let declined = Arc::new(OutboundEvent::new(
                    events::CALL_DECLINED,
                    json!({ "callId": call_id, "userId": conn.user_id() }),
                ));
                for participant in &session.participants {
                    self.rooms.leave(participant, &key);
                    participant.deliver(Arc::clone(&declined));
                }
                self.stop_ringing(conn.user_id(), call_id, conn.id(), "declined_elsewhere");
                session.advance(CallState::Ended);

                FinishedCall {
                    conversation_id: session.conversation_id,
                    initiator: session.initiator,
                    summary: session.summary(CallOutcome::Declined, 0),
                }
            }
            _ => {
                return Err(AppError::NotFound(format!(
                    "no ringing call {} for this user",
                    call_id
                )))
            }
        };

        tracing::info!(call_id = %call_id, user_id = %conn.user_id(), "Call declined");
        self.record_history(finished);
        self.update_gauge();
        Ok(())
    }

    /// Leave every call the connection is part of.
    pub fn remove_connection(&self, conn: &Connection) {
        for key in conn.rooms() {
            if let Some(call_id) = key.as_call() {
                self.leave(conn, call_id);
            }
        }
    }

    pub fn state(&self, call_id: &CallId) -> Option<CallState> {
        self.sessions.get(call_id).map(|s| s.state)
    }

    pub fn participants(&self, call_id: &CallId) -> Vec<ConnectionId> {
        self.sessions
            .get(call_id)
            .map(|s| s.participants.iter().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    pub fn active_calls(&self) -> usize {
        self.sessions.len()
    }

    /// Notify everyone still attached to a removed session and empty its room.
    fn finalize(
        &self,
        mut session: CallSession,
        ended_by: UserId,
        exclude: Option<ConnectionId>,
    ) -> FinishedCall {
        let now = Utc::now();
        let summary = session.final_summary(now);
        let key = RoomKey::Call(session.call_id.clone());

        let ended = Arc::new(OutboundEvent::new(
            events::CALL_ENDED,
            json!({
                "callId": session.call_id,
                "endedBy": ended_by,
                "outcome": summary.outcome,
                "durationSecs": summary.duration_secs,
            }),
        ));
        for participant in &session.participants {
            self.rooms.leave(participant, &key);
            if Some(participant.id()) != exclude {
                participant.deliver(Arc::clone(&ended));
            }
        }
        if let Some(target) = session.ringing.take() {
            for conn in self.registry.get_connections(target) {
                conn.deliver(Arc::clone(&ended));
            }
        }
        session.advance(CallState::Ended);

        tracing::info!(
            call_id = %session.call_id,
            outcome = %summary.outcome,
            duration_secs = summary.duration_secs,
            lifetime_secs = (now - session.started_at).num_seconds(),
            "Call finalized"
        );

        FinishedCall {
            conversation_id: session.conversation_id,
            initiator: session.initiator,
            summary,
        }
    }

    /// Tell the callee's other devices to stop ringing.
    fn stop_ringing(
        &self,
        target: UserId,
        call_id: &CallId,
        handled_on: ConnectionId,
        reason: &'static str,
    ) {
        for conn in self.registry.get_connections(target) {
            if conn.id() != handled_on {
                conn.emit(
                    events::CALL_ENDED,
                    json!({ "callId": call_id, "reason": reason }),
                );
            }
        }
    }

    async fn participants_of(
        &self,
        conversation_id: ConversationId,
        caller: &Connection,
    ) -> Result<Vec<UserId>, AppError> {
        let participants = self.conversations.list_participants(conversation_id).await?;
        if !participants.contains(&caller.user_id()) {
            return Err(AppError::Forbidden(
                "not a participant of this conversation".into(),
            ));
        }
        Ok(participants)
    }

    /// The conversation a call belongs to, after checking that `conn` is one
    /// of its participants.
    ///
    /// A live session carries its conversation. Otherwise a call id naming a
    /// known conversation scopes the call to it; anything else is an ad-hoc
    /// call open to whoever knows the id.
    async fn conversation_scope(
        &self,
        conn: &Connection,
        call_id: &CallId,
    ) -> Result<Option<ConversationId>, AppError> {
        let bound = self.sessions.get(call_id).and_then(|s| s.conversation_id);
        let Some(conversation_id) = bound.or_else(|| Uuid::parse_str(call_id).ok()) else {
            return Ok(None);
        };

        let participants = self.conversations.list_participants(conversation_id).await?;
        if participants.is_empty() && bound.is_none() {
            return Ok(None);
        }
        if !participants.contains(&conn.user_id()) {
            tracing::debug!(
                call_id = %call_id,
                user_id = %conn.user_id(),
                "Join refused for non-participant"
            );
            return Err(AppError::Forbidden(
                "not a participant of this conversation".into(),
            ));
        }
        Ok(Some(conversation_id))
    }

    fn record_history(&self, finished: FinishedCall) {
        let Some(conversation_id) = finished.conversation_id else {
            return;
        };
        let messages = Arc::clone(&self.messages);
        let entry = NewMessage::call_history(conversation_id, finished.initiator, finished.summary);
        detach("create_call_message", async move {
            messages.create_message(entry).await
        });
    }

    fn update_gauge(&self) {
        metrics::set_active_calls(self.sessions.len() as i64);
    }
}

fn incoming_payload(call_id: &CallId, caller: &Connection, request: &CallStartPayload) -> Value {
    json!({
        "callId": call_id,
        "conversationId": request.conversation_id,
        "isVideo": request.is_video,
        "isGroup": request.is_group,
        "caller": caller.identity(),
        "fromConnectionId": caller.id(),
    })
}
