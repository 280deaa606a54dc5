use crate::mem::{Memory, MemoryError};
use crate::protocol::{RelayKind, RelayMessage};
use crate::role::{Role, SlotRole, SlotTable};
use crate::stage::LinkStage;

#[derive(Default)]
struct SlotState {
    /// Current command cycle. Incremented on every rising edge of the exec bit.
    cycle: u32,

    /// Whether the exec bit was set at the end of the last tick.
    pending: bool,

    /// Whether we cleared the exec bit for the current cycle ourselves.
    answered: bool,

    /// Buffer A to hold in place while the command is pending.
    buffer_a: Option<Vec<u8>>,

    /// Buffer B we wrote for a remote battler, held in place until its next command.
    buffer_b: Option<Vec<u8>>,

    commands: std::collections::VecDeque<RelayMessage>,
    responses: std::collections::VecDeque<RelayMessage>,
}

impl SlotState {
    fn drop_stale(queue: &mut std::collections::VecDeque<RelayMessage>, slot: usize, before: u32) {
        while let Some(msg) = queue.front() {
            if msg.cycle >= before {
                break;
            }
            log::debug!(
                "dropping stale {:?} for slot {} cycle {} (now at {})",
                msg.kind,
                slot,
                msg.cycle,
                before
            );
            queue.pop_front();
        }
    }
}

#[derive(Default, Debug)]
pub struct TickReport {
    /// Messages to send to the remote, in order.
    pub outbound: Vec<RelayMessage>,

    /// Whether any exec bit changed, by the simulator or by us.
    pub progressed: bool,

    /// Whether any relay message was sent or applied.
    pub relayed: bool,
}

/// Relays controller buffers between the local simulator and the remote one.
pub struct Relay {
    munger: crate::munger::Munger,
    role: Role,
    table: SlotTable,
    prev_flags: u32,
    slots: [SlotState; crate::MAX_BATTLERS],
    context: crate::context::Synchronizer,
}

impl Relay {
    pub fn new(munger: crate::munger::Munger, role: Role, table: SlotTable) -> Self {
        Self {
            munger,
            role,
            table,
            prev_flags: 0,
            slots: Default::default(),
            context: crate::context::Synchronizer::new(),
        }
    }

    /// Forgets all per-slot state. Bits that are already set will be seen as new commands on the next tick.
    pub fn reset(&mut self) {
        self.prev_flags = 0;
        self.slots = Default::default();
        self.context.reset();
    }

    /// Switches from the handshake relay to the main loop relay. Queued messages are kept, since the remote may have
    /// entered the main loop first.
    pub fn enter_main_loop(&mut self) {
        self.prev_flags = 0;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub fn cycle(&self, slot: usize) -> u32 {
        self.slots[slot].cycle
    }

    /// Whether any remote battler has a command outstanding that we have not answered yet.
    pub fn awaiting_remote(&self) -> bool {
        self.table
            .slots_with_role(SlotRole::RemoteRelayed)
            .any(|slot| self.slots[slot].pending && !self.slots[slot].answered)
    }

    /// Queues a message from the remote. It takes effect on the next tick.
    ///
    /// Returns false if the message was malformed or misrouted and has been dropped.
    pub fn receive(&mut self, msg: RelayMessage) -> bool {
        let slot = msg.slot as usize;
        if slot >= crate::MAX_BATTLERS {
            log::warn!("dropping {:?} for out of range slot {}", msg.kind, slot);
            return false;
        }
        if msg.bytes.len() > crate::BUFFER_SIZE {
            log::warn!(
                "dropping {:?} for slot {}: {} bytes is over the buffer size",
                msg.kind,
                slot,
                msg.bytes.len()
            );
            return false;
        }
        if msg.stage != LinkStage::MainLoop {
            log::warn!("dropping {:?} for slot {} sent during {:?}", msg.kind, slot, msg.stage);
            return false;
        }

        let slot_role = self.table.role(slot);
        match msg.kind {
            RelayKind::Command => {
                if slot_role == SlotRole::LocalAiBypassed {
                    log::warn!("dropping command for slot {} which is not relayed", slot);
                    return false;
                }
                if msg.context.is_none() {
                    log::warn!("dropping command for slot {} without context", slot);
                    return false;
                }
                log::debug!("received command for slot {} cycle {}", slot, msg.cycle);
                self.slots[slot].commands.push_back(msg);
            }
            RelayKind::Response => {
                if slot_role != SlotRole::RemoteRelayed {
                    log::warn!("dropping response for slot {} which is not remote", slot);
                    return false;
                }
                log::debug!("received response for slot {} cycle {}", slot, msg.cycle);
                self.slots[slot].responses.push_back(msg);
            }
        }
        true
    }

    /// Runs one tick of the main loop relay.
    pub fn tick(&mut self, core: &mut dyn Memory) -> Result<TickReport, MemoryError> {
        let mut report = TickReport::default();
        let flags = self.munger.exec_flags(core)?;

        for slot in 0..crate::MAX_BATTLERS {
            let slot_role = self.table.role(slot);
            if slot_role == SlotRole::LocalAiBypassed {
                continue;
            }

            let bit = 1 << slot;
            let now = flags & bit != 0;
            let was = self.prev_flags & bit != 0;

            if now && !was {
                self.on_new_command(core, slot, &mut report)?;
            } else if !now && was {
                self.on_command_finished(core, slot, &mut report)?;
            }

            if now {
                self.service_pending(core, slot, &mut report)?;
            } else {
                let state = &mut self.slots[slot];
                SlotState::drop_stale(&mut state.commands, slot, state.cycle + 1);
                SlotState::drop_stale(&mut state.responses, slot, state.cycle + 1);
            }
        }

        self.reassert(core)?;

        let flags = self.munger.exec_flags(core)?;
        for (slot, state) in self.slots.iter_mut().enumerate() {
            state.pending = flags & (1 << slot) != 0;
        }
        self.prev_flags = flags;

        Ok(report)
    }

    /// Handshake form of the relay: nothing goes over the wire, and remote battlers answer immediately.
    pub fn handshake_tick(&mut self, core: &mut dyn Memory) -> Result<TickReport, MemoryError> {
        let mut report = TickReport::default();
        let flags = self.munger.exec_flags(core)?;
        let mut cleared = flags;
        for slot in self.table.slots_with_role(SlotRole::RemoteRelayed) {
            if flags & (1 << slot) != 0 {
                cleared &= !(1 << slot);
            }
        }
        if cleared != flags {
            self.munger.set_exec_flags(core, cleared)?;
            report.progressed = true;
        }
        if flags != self.prev_flags {
            report.progressed = true;
        }
        self.prev_flags = cleared;
        Ok(report)
    }

    fn on_new_command(
        &mut self,
        core: &mut dyn Memory,
        slot: usize,
        report: &mut TickReport,
    ) -> Result<(), MemoryError> {
        let slot_role = self.table.role(slot);
        let buffer_a = self.munger.buffer_a(core, slot)?;
        let context = self.munger.context_vars(core)?;

        let state = &mut self.slots[slot];
        state.cycle += 1;
        state.answered = false;
        state.buffer_b = None;
        state.buffer_a = Some(buffer_a.clone());
        report.progressed = true;

        log::debug!(
            "new command for slot {} ({:?}) cycle {}: {:02x?}",
            slot,
            slot_role,
            state.cycle,
            &buffer_a[..4]
        );

        if self.role.forwards_command(slot_role) {
            report.outbound.push(RelayMessage {
                kind: RelayKind::Command,
                slot: slot as u8,
                stage: LinkStage::MainLoop,
                cycle: state.cycle,
                bytes: buffer_a,
                context: Some(context),
            });
            report.relayed = true;
        }
        Ok(())
    }

    fn on_command_finished(
        &mut self,
        core: &mut dyn Memory,
        slot: usize,
        report: &mut TickReport,
    ) -> Result<(), MemoryError> {
        let slot_role = self.table.role(slot);
        let state = &mut self.slots[slot];
        state.buffer_a = None;
        report.progressed = true;

        match slot_role {
            SlotRole::LocalHuman => {
                let buffer_b = self.munger.buffer_b(core, slot)?;
                log::debug!("slot {} answered cycle {} locally", slot, state.cycle);
                report.outbound.push(RelayMessage {
                    kind: RelayKind::Response,
                    slot: slot as u8,
                    stage: LinkStage::MainLoop,
                    cycle: state.cycle,
                    bytes: buffer_b,
                    context: None,
                });
                report.relayed = true;
            }
            SlotRole::RemoteRelayed => {
                if !state.answered {
                    log::warn!(
                        "exec flag for remote slot {} cleared without an answer in cycle {}",
                        slot,
                        state.cycle
                    );
                }
            }
            SlotRole::LocalAiBypassed => {}
        }
        Ok(())
    }

    fn service_pending(
        &mut self,
        core: &mut dyn Memory,
        slot: usize,
        report: &mut TickReport,
    ) -> Result<(), MemoryError> {
        let accepts_remote_commands = self.role.accepts_remote_commands();
        let state = &mut self.slots[slot];
        let cycle = state.cycle;

        SlotState::drop_stale(&mut state.commands, slot, cycle);
        if state.commands.front().map(|msg| msg.cycle == cycle).unwrap_or(false) {
            if let Some(msg) = state.commands.pop_front() {
                if accepts_remote_commands {
                    let context = msg.context.unwrap_or_default();
                    self.context
                        .bind_command(core, &self.munger, slot, cycle, &context, &msg.bytes)?;
                    state.buffer_a = Some(msg.bytes);
                    report.relayed = true;
                } else if let Some(buffer_a) = state.buffer_a.as_ref() {
                    if buffer_a[..msg.bytes.len()] != msg.bytes[..] {
                        log::warn!(
                            "command for slot {} cycle {} diverged: local {:02x?}, remote {:02x?}",
                            slot,
                            cycle,
                            &buffer_a[..4],
                            &msg.bytes[..msg.bytes.len().min(4)]
                        );
                    }
                }
            }
        }

        if self.table.role(slot) != SlotRole::RemoteRelayed {
            return Ok(());
        }

        if state.answered {
            // Cleared by us, but the simulator raised it again within the same cycle. Hold it until the next cycle.
            return Ok(());
        }

        SlotState::drop_stale(&mut state.responses, slot, cycle);
        if state.responses.front().map(|msg| msg.cycle == cycle).unwrap_or(false) {
            if let Some(msg) = state.responses.pop_front() {
                self.munger.set_buffer_b(core, slot, &msg.bytes)?;
                self.munger.clear_exec_bit(core, slot)?;
                log::debug!("answered remote slot {} cycle {}", slot, cycle);
                state.answered = true;
                state.buffer_a = None;
                state.buffer_b = Some(msg.bytes);
                report.progressed = true;
                report.relayed = true;
            }
        }
        Ok(())
    }

    /// Puts the buffers of every in-flight command back, in case the simulator scribbled over them since.
    fn reassert(&mut self, core: &mut dyn Memory) -> Result<(), MemoryError> {
        for (slot, state) in self.slots.iter().enumerate() {
            if let Some(buffer_a) = state.buffer_a.as_ref() {
                self.munger.set_buffer_a(core, slot, buffer_a)?;
            }
            if let Some(buffer_b) = state.buffer_b.as_ref() {
                self.munger.set_buffer_b(core, slot, buffer_b)?;
            }
        }
        Ok(())
    }
}
