//! Control sessions
//!
//! A session turns request packets into store operations and answers every
//! request with exactly one response packet. A bad command gets an ERROR
//! response; it never ends the session.

use bytes::Bytes;
use core_types::{NecpError, Pid, SessionId};
use necp_wire::{Command, DumpEntry, Packet, PacketHeader, Response, ResponseBody, WireError};
use policy::{PolicySnapshot, PolicyStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// One open control session
#[derive(Debug)]
pub struct PolicySession {
    id: SessionId,
    pid: Pid,
    store: Arc<PolicyStore>,
}

impl PolicySession {
    pub(crate) fn open(store: Arc<PolicyStore>, pid: Pid, name: &str) -> Self {
        let id = store.create_session(name);
        Self { id, pid, store }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Process that opened the session
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Handles one raw request and returns the encoded response.
    ///
    /// Fails only when the request is too short to carry a header, since there
    /// is then no message id to answer.
    pub fn handle(&self, request: &[u8]) -> Result<Bytes, WireError> {
        self.handle_from(self.pid, request)
    }

    /// Like [`PolicySession::handle`] for a request sent by `sender`
    pub fn handle_from(&self, sender: Pid, request: &[u8]) -> Result<Bytes, WireError> {
        let header = PacketHeader::decode(request)?;
        let response = match Packet::decode(request) {
            Ok(packet) => self.dispatch(sender, &packet),
            Err(error) => {
                warn!(session = %self.id, message_id = header.message_id, %error, "malformed packet");
                Response::error(&header, error.into())
            }
        };
        Ok(response.encode())
    }

    /// Executes a decoded packet on behalf of `sender`
    pub fn dispatch(&self, sender: Pid, packet: &Packet) -> Response {
        let outcome = self
            .store
            .authorize(self.id, sender)
            .and_then(|()| Command::from_packet(packet).map_err(NecpError::from))
            .and_then(|command| self.execute(sender, command));
        match outcome {
            Ok(body) => Response::ok(&packet.header, body),
            Err(error) => {
                debug!(
                    session = %self.id,
                    packet_type = packet.header.packet_type,
                    message_id = packet.header.message_id,
                    %error,
                    "command failed"
                );
                Response::error(&packet.header, error)
            }
        }
    }

    fn execute(&self, sender: Pid, command: Command) -> Result<ResponseBody, NecpError> {
        let store = &self.store;
        let session = self.id;
        match command {
            Command::PolicyAdd {
                order,
                conditions,
                result,
            } => store
                .add(session, order, conditions, result)
                .map(ResponseBody::PolicyId),
            Command::PolicyGet(id) => store
                .get(session, id)
                .map(|policy| ResponseBody::policy(&policy)),
            Command::PolicyDelete(id) => store.delete(session, id).map(|()| ResponseBody::Empty),
            Command::PolicyApplyAll => store.apply_all(session).map(|_| ResponseBody::Empty),
            Command::PolicyListAll => store.list_all(session).map(ResponseBody::PolicyIds),
            Command::PolicyDeleteAll => store.delete_all(session).map(|()| ResponseBody::Empty),
            Command::SetSessionPriority(priority) => store
                .set_priority(session, priority)
                .map(|()| ResponseBody::Empty),
            Command::LockSessionToProc => store
                .lock_to_process(session, sender)
                .map(|()| ResponseBody::Empty),
            Command::RegisterService(service) => store
                .register_service(session, service)
                .map(|()| ResponseBody::Empty),
            Command::UnregisterService(service) => store
                .unregister_service(session, service)
                .map(|()| ResponseBody::Empty),
            Command::PolicyDumpAll => Ok(ResponseBody::Dump(dump_entries(&store.snapshot()))),
        }
    }

    /// Closes the session, withdrawing its applied policies and services
    pub fn close(self) -> Result<(), NecpError> {
        self.store.close_session(self.id)
    }
}

/// Read-only view of an applied snapshot, in evaluation order
pub fn dump_entries(snapshot: &PolicySnapshot) -> Vec<DumpEntry> {
    snapshot
        .policies()
        .iter()
        .map(|applied| DumpEntry {
            policy_id: applied.policy.id,
            order: applied.policy.order,
            session_priority: applied.priority,
            session_order: applied.session_order,
            owner: applied.owner_name.clone(),
            result: applied.policy.result.clone(),
            conditions: applied.policy.conditions.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Condition, PolicyCondition, PolicyId, PolicyResult, SessionPriority};
    use necp_wire::PacketType;

    fn session() -> PolicySession {
        PolicySession::open(Arc::new(PolicyStore::new()), 10, "test")
    }

    fn send(session: &PolicySession, command: Command) -> Response {
        let response = session.handle(&command.encode(1)).unwrap();
        Response::decode(&response).unwrap()
    }

    #[test]
    fn test_add_then_get() {
        let session = session();
        let conditions = vec![PolicyCondition::new(Condition::Domain("apple.com".into()))];
        let added = send(
            &session,
            Command::PolicyAdd {
                order: 10,
                conditions: conditions.clone(),
                result: PolicyResult::Drop,
            },
        );
        let Ok(ResponseBody::PolicyId(id)) = added.outcome else {
            panic!("unexpected response {:?}", added);
        };

        let got = send(&session, Command::PolicyGet(id));
        match got.outcome {
            Ok(ResponseBody::Policy(body)) => {
                assert_eq!(body.order, 10);
                assert_eq!(body.conditions, conditions);
                assert_eq!(body.result, PolicyResult::Drop);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_errors_keep_session_open() {
        let session = session();
        let missing = send(&session, Command::PolicyDelete(PolicyId::new(99)));
        assert_eq!(missing.outcome, Err(NecpError::PolicyIdNotFound));

        let invalid = send(
            &session,
            Command::PolicyAdd {
                order: 1,
                conditions: vec![
                    PolicyCondition::new(Condition::Default),
                    PolicyCondition::new(Condition::Domain("apple.com".into())),
                ],
                result: PolicyResult::Pass,
            },
        );
        assert_eq!(invalid.outcome, Err(NecpError::PolicyConditionsInvalid));

        let listed = send(&session, Command::PolicyListAll);
        assert_eq!(listed.outcome, Ok(ResponseBody::PolicyIds(Vec::new())));
    }

    #[test]
    fn test_unknown_packet_type() {
        let session = session();
        let request = [0xee, 0, 5, 0, 0, 0];
        let response = Response::decode(&session.handle(&request).unwrap()).unwrap();
        assert_eq!(response.packet_type, 0xee);
        assert_eq!(response.message_id, 5);
        assert_eq!(response.outcome, Err(NecpError::UnknownPacketType));
    }

    #[test]
    fn test_truncated_tlv_is_invalid() {
        let session = session();
        let mut request = Command::PolicyGet(PolicyId::new(1)).encode(3).to_vec();
        request.truncate(request.len() - 2);
        let response = Response::decode(&session.handle(&request).unwrap()).unwrap();
        assert_eq!(response.packet_type, PacketType::PolicyGet.code());
        assert_eq!(response.outcome, Err(NecpError::InvalidTlv));

        assert!(session.handle(&[1, 0]).is_err());
    }

    #[test]
    fn test_lock_rejects_other_process() {
        let session = session();
        assert!(send(&session, Command::LockSessionToProc).is_ok());
        let request = Command::PolicyListAll.encode(4);
        let response = Response::decode(&session.handle_from(11, &request).unwrap()).unwrap();
        assert_eq!(response.outcome, Err(NecpError::InvalidProcess));
        let response = Response::decode(&session.handle_from(10, &request).unwrap()).unwrap();
        assert!(response.is_ok());
    }

    #[test]
    fn test_dump_reports_applied_only() {
        let session = session();
        send(&session, Command::SetSessionPriority(SessionPriority::High));
        send(
            &session,
            Command::PolicyAdd {
                order: 5,
                conditions: vec![PolicyCondition::new(Condition::Default)],
                result: PolicyResult::Pass,
            },
        );
        assert_eq!(
            send(&session, Command::PolicyDumpAll).outcome,
            Ok(ResponseBody::Dump(Vec::new()))
        );

        send(&session, Command::PolicyApplyAll);
        match send(&session, Command::PolicyDumpAll).outcome {
            Ok(ResponseBody::Dump(entries)) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].order, 5);
                assert_eq!(entries[0].session_priority, SessionPriority::High);
                assert_eq!(entries[0].owner, "test");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
