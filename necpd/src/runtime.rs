//! # Host Runtime
//!
//! Boots a simulated kernel, opens one control session and one client
//! channel, and runs script commands against them. Policy commands travel as
//! encoded control packets; client commands call the registry directly.

use core_types::{ChannelId, ClientId};
use kernel_api::{Credentials, ProcessCredentials};
use necp_wire::{decode_client_list, encode_parameters, Response, ResponseBody, WireError};
use serde::Serialize;
use services_client_registry::{ChannelFlags, ClientError};
use services_policy_session::{HostError, NecpContext, NecpHost, PolicySession};
use sim_kernel::SimulatedKernel;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::commands::ScriptCommand;
use crate::config::NecpdConfig;
use crate::script::{Script, ScriptError, ScriptLine};

/// Host runtime error types
#[derive(Debug, Error)]
pub enum HostRuntimeError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Script error: {0}")]
    ScriptError(#[from] ScriptError),

    #[error("Host error: {0}")]
    HostError(#[from] HostError),

    #[error("Wire error: {0}")]
    WireError(#[from] WireError),

    #[error("No client numbered {0}")]
    UnknownClient(usize),
}

/// Host runtime configuration
#[derive(Debug, Clone, Default)]
pub struct HostRuntimeConfig {
    pub config: NecpdConfig,
    /// Also print raw request, response and result bytes
    pub hex: bool,
}

/// Host runtime
pub struct HostRuntime {
    config: HostRuntimeConfig,
    kernel: SimulatedKernel,
    host: NecpHost,
    session: PolicySession,
    context: Arc<NecpContext>,
    channel: ChannelId,
    /// Clients by script number; removed clients leave a hole
    clients: Vec<Option<ClientId>>,
    next_message_id: u32,
    steps: usize,
}

impl HostRuntime {
    /// Creates a new host runtime
    pub fn new(config: HostRuntimeConfig) -> Result<Self, HostRuntimeError> {
        let settings = &config.config;
        let kernel = SimulatedKernel::from_config(&settings.kernel);
        ensure_process(&kernel, settings.daemon_pid, 0);
        ensure_process(&kernel, settings.client_pid, 501);

        let host = NecpHost::new(kernel.collaborators(), settings.necp());
        let session = host.open_session(settings.daemon_pid, "necpd")?;
        let (context, channel) = host.open_channel(settings.client_pid, ChannelFlags::empty())?;
        info!(
            session = %session.id(),
            channel = %channel,
            "host runtime started"
        );

        Ok(Self {
            config,
            kernel,
            host,
            session,
            context,
            channel,
            clients: Vec::new(),
            next_message_id: 1,
            steps: 0,
        })
    }

    /// Runs a script to completion and returns everything it printed
    pub fn run(&mut self, script: Script) -> Result<Vec<String>, HostRuntimeError> {
        let mut output = Vec::new();
        for line in script {
            output.extend(self.execute(&line)?);
        }
        Ok(output)
    }

    /// Executes one script line
    pub fn execute(&mut self, line: &ScriptLine) -> Result<Vec<String>, HostRuntimeError> {
        debug!(line = line.line, command = %line.text, "executing");
        self.steps += 1;
        let mut output = vec![format!("[{}] {}", line.line, line.text)];
        match line.command.to_command() {
            Some(command) => {
                let message_id = self.next_message_id;
                self.next_message_id = self.next_message_id.wrapping_add(1);
                let request = command.encode(message_id);
                let encoded = self.session.handle(&request)?;
                if self.config.hex {
                    output.push(format!("> {}", hex::encode(&request)));
                    output.push(format!("< {}", hex::encode(&encoded)));
                }
                output.extend(format_response(&Response::decode(&encoded)?));
            }
            None => output.extend(self.client_command(&line.command)?),
        }
        Ok(output)
    }

    fn client_command(&mut self, command: &ScriptCommand) -> Result<Vec<String>, HostRuntimeError> {
        let context = Arc::clone(&self.context);
        let registry = context.registry();
        let outcome = match command {
            ScriptCommand::ClientAdd(parameters) => encode_parameters(parameters)
                .map_err(ClientError::from)
                .and_then(|encoded| registry.add(self.channel, &encoded))
                .map(|id| {
                    self.clients.push(Some(id));
                    vec![format!("client {} {}", self.clients.len(), id)]
                }),
            ScriptCommand::ClientResult(number) => {
                let id = self.client(*number)?;
                let limit = self.config.config.limits.max_result_len;
                registry.copy_result(self.channel, id, limit).and_then(|encoded| {
                    let result = registry.result(self.channel, id)?;
                    let mut lines = vec![json_line(&result)];
                    if self.config.hex {
                        lines.push(format!("= {}", hex::encode(&encoded)));
                    }
                    Ok(lines)
                })
            }
            ScriptCommand::ClientRemove(number) => {
                let id = self.client(*number)?;
                registry.remove(self.channel, id).map(|()| {
                    self.clients[*number - 1] = None;
                    vec!["ok".to_string()]
                })
            }
            ScriptCommand::ClientList => registry.copy_list(self.channel).and_then(|encoded| {
                let ids = decode_client_list(&encoded).map_err(ClientError::from)?;
                let numbers: Vec<String> = self
                    .clients
                    .iter()
                    .enumerate()
                    .filter(|(_, id)| id.is_some_and(|id| ids.contains(&id)))
                    .map(|(index, _)| (index + 1).to_string())
                    .collect();
                Ok(vec![format!("clients [{}]", numbers.join(", "))])
            }),
            ScriptCommand::InterfacesBump => {
                let generation = self.kernel.interfaces.bump();
                let stale = registry.interfaces_changed();
                Ok(vec![format!(
                    "interfaces generation {}, {} clients stale",
                    generation, stale
                )])
            }
            _ => Ok(Vec::new()),
        };
        Ok(outcome.unwrap_or_else(|error| vec![format!("error {}", error)]))
    }

    fn client(&self, number: usize) -> Result<ClientId, HostRuntimeError> {
        number
            .checked_sub(1)
            .and_then(|index| self.clients.get(index).copied().flatten())
            .ok_or(HostRuntimeError::UnknownClient(number))
    }

    pub fn kernel(&self) -> &SimulatedKernel {
        &self.kernel
    }

    pub fn context(&self) -> &Arc<NecpContext> {
        &self.context
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    /// Closes the session and channel, releasing the context
    pub fn shutdown(self) -> Result<(), HostRuntimeError> {
        self.host.close_channel(self.channel)?;
        self.host.close_session(self.session)?;
        info!(steps = self.steps, "host runtime stopped");
        Ok(())
    }
}

fn ensure_process(kernel: &SimulatedKernel, pid: i32, uid: u32) {
    if kernel.collaborators().credentials.credentials(pid).is_err() {
        debug!(pid, uid, "adding process for the host runtime");
        kernel
            .processes
            .spawn(Credentials::new(pid, uid, Uuid::new_v4()));
    }
}

fn json_line(value: &impl Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("error encoding output: {}", e))
}

/// Renders a control response as output lines
pub fn format_response(response: &Response) -> Vec<String> {
    let body = match &response.outcome {
        Err(error) => return vec![format!("error {} ({})", error.code(), error)],
        Ok(body) => body,
    };
    match body {
        ResponseBody::Empty => vec!["ok".to_string()],
        ResponseBody::PolicyId(id) => vec![format!("ok {}", id)],
        ResponseBody::Policy(policy) => {
            let conditions: Vec<String> = policy.conditions.iter().map(|c| c.to_string()).collect();
            vec![format!(
                "ok order={} result={} conditions=[{}]",
                policy.order,
                policy.result,
                conditions.join(", ")
            )]
        }
        ResponseBody::PolicyIds(ids) => {
            let ids: Vec<String> = ids.iter().map(|id| id.get().to_string()).collect();
            vec![format!("ok [{}]", ids.join(", "))]
        }
        ResponseBody::Dump(entries) => {
            let mut lines = vec![format!("ok {} applied", entries.len())];
            lines.extend(entries.iter().map(json_line));
            lines
        }
    }
}
