//! Interactive console front end
//!
//! Prints scan results and hot-plug updates as they arrive, and reads
//! one-line commands from stdin. Permission requests the consent policy
//! leaves to the operator are queued and answered oldest first.

use crate::policy::{Consent, ConsentPolicy};
use crate::render::Renderer;
use anyhow::{Context, Result};
use common::{InspectorBridge, InspectorEvent};
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use types::{DeviceIdentity, ScanEntry, ScanReport};

const HELP: &str = "Commands: s|scan (rescan), y|yes / n|no (answer oldest prompt), h|help, q|quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    Answer(bool),
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line; `None` for anything unrecognized
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "" | "s" | "scan" => Some(Self::Scan),
            "y" | "yes" => Some(Self::Answer(true)),
            "n" | "no" => Some(Self::Answer(false)),
            "h" | "help" | "?" => Some(Self::Help),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Permission prompts waiting for the operator, oldest first
#[derive(Debug, Default)]
pub struct PromptQueue {
    pending: VecDeque<DeviceIdentity>,
}

impl PromptQueue {
    /// Queue a prompt; returns false if one is already open for the device
    pub fn push(&mut self, identity: DeviceIdentity) -> bool {
        if self.pending.contains(&identity) {
            return false;
        }
        self.pending.push_back(identity);
        true
    }

    pub fn pop_oldest(&mut self) -> Option<DeviceIdentity> {
        self.pending.pop_front()
    }

    pub fn oldest(&self) -> Option<&DeviceIdentity> {
        self.pending.front()
    }

    /// Drop the prompt for a detached device
    pub fn remove(&mut self, identity: &DeviceIdentity) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending != identity);
        self.pending.len() != before
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

struct Console {
    bridge: InspectorBridge,
    policy: ConsentPolicy,
    renderer: Renderer,
    prompts: PromptQueue,
}

impl Console {
    async fn handle_event(&mut self, event: InspectorEvent) -> Result<()> {
        match event {
            InspectorEvent::ScanCompleted(report) => self.print_report(&report)?,
            InspectorEvent::PermissionRequested(identity) => {
                self.handle_permission_request(identity).await?
            }
            InspectorEvent::DeviceReady(entry) => self.print_entry(&entry)?,
            InspectorEvent::DeviceDetached(identity) => {
                if self.prompts.remove(&identity) {
                    debug!("Dropped pending prompt for {}", identity);
                }
                println!("Device detached: {}", identity);
            }
        }
        Ok(())
    }

    async fn handle_permission_request(&mut self, identity: DeviceIdentity) -> Result<()> {
        match self.policy.decide(&identity) {
            Consent::Grant => {
                println!("Access to {} granted by policy", identity);
                self.answer(identity, true).await
            }
            Consent::Deny => {
                println!("Access to {} denied by policy", identity);
                self.answer(identity, false).await
            }
            Consent::Ask => {
                if self.prompts.push(identity.clone()) {
                    println!("Allow access to {}? [y/n]", identity);
                }
                Ok(())
            }
        }
    }

    /// Returns false when the session should end
    async fn handle_command(&mut self, command: ConsoleCommand) -> Result<bool> {
        match command {
            ConsoleCommand::Scan => {
                let report = self.bridge.scan().await.context("Scan failed")?;
                self.print_report(&report)?;
            }
            ConsoleCommand::Answer(granted) => match self.prompts.pop_oldest() {
                Some(identity) => {
                    self.answer(identity, granted).await?;
                    if let Some(next) = self.prompts.oldest() {
                        println!("Allow access to {}? [y/n]", next);
                    }
                }
                None => println!("No permission request is waiting"),
            },
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    async fn answer(&self, identity: DeviceIdentity, granted: bool) -> Result<()> {
        self.bridge
            .answer_permission(identity, granted)
            .await
            .context("Failed to send permission result")
    }

    fn print_report(&self, report: &ScanReport) -> Result<()> {
        self.renderer
            .write_report(&mut io::stdout().lock(), report)
            .context("Failed to write scan report")
    }

    fn print_entry(&self, entry: &ScanEntry) -> Result<()> {
        self.renderer
            .write_entry(&mut io::stdout().lock(), entry)
            .context("Failed to write device entry")
    }
}

/// Run the interactive console until quit, EOF or Ctrl+C
pub async fn run(bridge: InspectorBridge, policy: ConsentPolicy, renderer: Renderer) -> Result<()> {
    let mut console = Console {
        bridge,
        policy,
        renderer,
        prompts: PromptQueue::default(),
    };
    let events = console.bridge.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    loop {
        tokio::select! {
            event = events.recv_event() => {
                let event = event.context("USB worker stopped")?;
                console.handle_event(event).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Stdin closed, leaving console");
                    break;
                };
                match ConsoleCommand::parse(&line) {
                    Some(command) => {
                        if !console.handle_command(command).await? {
                            break;
                        }
                    }
                    None => println!("Unknown command '{}'. {}", line.trim(), HELP),
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, leaving console");
                break;
            }
        }
    }

    if !console.prompts.is_empty() {
        info!(
            "{} permission request(s) left unanswered",
            console.prompts.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector::testing::create_mock_identity;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse(""), Some(ConsoleCommand::Scan));
        assert_eq!(ConsoleCommand::parse(" scan "), Some(ConsoleCommand::Scan));
        assert_eq!(ConsoleCommand::parse("Y"), Some(ConsoleCommand::Answer(true)));
        assert_eq!(ConsoleCommand::parse("no"), Some(ConsoleCommand::Answer(false)));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("reboot"), None);
    }

    #[test]
    fn test_prompt_queue_order_and_dedup() {
        let first = create_mock_identity(1, 0x1234, 0x5678);
        let second = create_mock_identity(2, 0xabcd, 0x0001);
        let mut queue = PromptQueue::default();

        assert!(queue.push(first.clone()));
        assert!(queue.push(second.clone()));
        assert!(!queue.push(first.clone()));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop_oldest(), Some(first));
        assert_eq!(queue.oldest(), Some(&second));
    }

    #[test]
    fn test_prompt_removed_on_detach() {
        let identity = create_mock_identity(1, 0x1234, 0x5678);
        let mut queue = PromptQueue::default();
        queue.push(identity.clone());

        assert!(queue.remove(&identity));
        assert!(!queue.remove(&identity));
        assert!(queue.is_empty());
    }
}
