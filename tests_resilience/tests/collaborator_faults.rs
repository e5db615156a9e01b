//! Collaborator Fault Tests
//!
//! Validates that rejected agent and nexus requests and vanished processes
//! surface as errors without corrupting registry state.

use core_types::{ChannelId, ClientId, ClientParameter};
use kernel_api::{Credentials, KernelError, NetAgentFlags, NetAgentInfo};
use necp_wire::{encode_parameters, ClientResultView};
use services_client_registry::{ChannelFlags, ClientError, ClientRegistry, ClientState, MAX_RESULT_LEN};
use services_policy_session::HostError;
use sim_kernel::fault_injection::{CollaboratorFault, FaultPlan};
use sim_kernel::request_audit::RequestEvent;
use tests_resilience::{bootstrap_with_faults, APP_PID, DAEMON_PID};
use uuid::Uuid;

const HIDDEN_PID: i32 = 400;

fn domain(host: &str) -> Vec<u8> {
    encode_parameters(&[ClientParameter::Domain(host.to_string())]).unwrap().to_vec()
}

fn view(registry: &ClientRegistry, channel: ChannelId, client: ClientId) -> ClientResultView {
    let encoded = registry.copy_result(channel, client, MAX_RESULT_LEN).unwrap();
    ClientResultView::decode(&encoded).unwrap()
}

#[test]
fn test_rejected_agent_request_can_be_retried() {
    let (kernel, host) = bootstrap_with_faults(
        FaultPlan::new().with_fault(CollaboratorFault::RejectAgentRequests { count: 1 }),
    );
    let vpn = Uuid::new_v4();
    kernel.agents.add(NetAgentInfo::new(vpn, "com.example", "VPN"));
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let registry = context.registry();
    let client = registry.add(channel, &domain("example.com")).unwrap();

    let actions = encode_parameters(&[ClientParameter::AssertAgent(vpn)]).unwrap();
    assert!(matches!(
        registry.agent(channel, client, &actions),
        Err(ClientError::Collaborator(KernelError::RequestRejected(_)))
    ));
    assert_eq!(kernel.agents.pending_requests(), 0);
    assert_eq!(registry.client_state(client), ClientState::Registered);

    assert_eq!(registry.agent(channel, client, &actions), Ok(1));
    assert_eq!(kernel.agents.pending_requests(), 1);

    let audit = kernel.agents.audit();
    assert_eq!(audit.events().len(), 2);
    assert!(!audit.events()[0].accepted);
    assert!(audit.events()[1].accepted);
    host.close_channel(channel).unwrap();
}

#[test]
fn test_rejected_nexus_request_leaves_result_unassigned() {
    let (kernel, host) = bootstrap_with_faults(
        FaultPlan::new().with_fault(CollaboratorFault::RejectNexusRequests { count: 2 }),
    );
    let provider = Uuid::new_v4();
    kernel.agents.add(
        NetAgentInfo::new(provider, "com.example", "Nexus")
            .with_flags(NetAgentFlags::ACTIVE | NetAgentFlags::NEXUS_PROVIDER),
    );
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let registry = context.registry();
    let client = registry.add(channel, &domain("example.com")).unwrap();

    for _ in 0..2 {
        assert!(matches!(
            registry.request_nexus_instance(channel, client, provider),
            Err(ClientError::Collaborator(KernelError::RequestRejected(_)))
        ));
    }
    assert!(kernel.nexus.assign_next().is_none());
    assert!(view(registry, channel, client).nexus.is_none());

    registry
        .request_nexus_instance(channel, client, provider)
        .unwrap();
    let (request, instance) = kernel.nexus.assign_next().unwrap();
    assert_eq!(request.client, client);
    registry.nexus_assigned(client, instance).unwrap();
    assert_eq!(view(registry, channel, client).nexus, Some(instance));

    let audit = kernel.nexus.audit();
    assert_eq!(
        audit.count_events(|e| matches!(e.event, RequestEvent::Nexus(_)) && !e.accepted),
        2
    );
    host.close_channel(channel).unwrap();
}

#[test]
fn test_hidden_process_cannot_open_anything() {
    let (kernel, host) = bootstrap_with_faults(
        FaultPlan::new().with_fault(CollaboratorFault::UnknownProcess { pid: HIDDEN_PID }),
    );
    kernel
        .processes
        .spawn(Credentials::new(HIDDEN_PID, 0, Uuid::new_v4()));

    assert_eq!(
        host.open_session(HIDDEN_PID, "hidden").unwrap_err(),
        HostError::Kernel(KernelError::ProcessNotFound(HIDDEN_PID))
    );
    assert_eq!(
        host.open_channel(HIDDEN_PID, ChannelFlags::empty()).unwrap_err(),
        HostError::Client(ClientError::Collaborator(KernelError::ProcessNotFound(
            HIDDEN_PID
        )))
    );
    // Failed opens do not keep a context alive
    assert!(host.context().is_none());
    assert_eq!(host.channel_count(), 0);

    let session = host.open_session(DAEMON_PID, "daemon").unwrap();
    assert_eq!(host.session_count(), 1);
    host.close_session(session).unwrap();
}

#[test]
fn test_unknown_agent_is_not_a_fault() {
    let (kernel, host) = bootstrap_with_faults(
        FaultPlan::new().with_fault(CollaboratorFault::RejectAgentRequests { count: 1 }),
    );
    let (context, channel) = host.open_channel(APP_PID, ChannelFlags::empty()).unwrap();
    let registry = context.registry();
    let client = registry.add(channel, &domain("example.com")).unwrap();

    // Requests for missing agents fail before the fault plan is consulted
    let missing = Uuid::new_v4();
    let actions = encode_parameters(&[ClientParameter::TriggerAgent(missing)]).unwrap();
    assert_eq!(
        registry.agent(channel, client, &actions),
        Err(ClientError::Collaborator(KernelError::AgentNotFound(missing)))
    );

    let vpn = Uuid::new_v4();
    kernel.agents.add(NetAgentInfo::new(vpn, "com.example", "VPN"));
    let actions = encode_parameters(&[ClientParameter::TriggerAgent(vpn)]).unwrap();
    assert!(registry.agent(channel, client, &actions).is_err());
    assert_eq!(registry.agent(channel, client, &actions), Ok(1));
    host.close_channel(channel).unwrap();
}
