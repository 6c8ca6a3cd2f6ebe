//! Drives admin commands through a loopback channel
//!
//! Submission never blocks: when the pool is exhausted the runner polls the
//! channel to free a slot and tries again.

use crate::config::{ChannelConfig, CommandConfig};
use crate::report::{AdminReport, CompletionRecord};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use spdk_bridge::engine::{create_snapshot, nvme_admin, DmaBuf, IdentifyController};
use spdk_bridge::nvme::{admin_opc, IDENTIFY_DATA_LEN};
use spdk_bridge::{Device, LoopbackChannel, NvmeCmd};
use std::cell::RefCell;
use std::rc::Rc;

impl CommandConfig {
    pub fn name(&self) -> &'static str {
        match self {
            CommandConfig::Identify => "identify",
            CommandConfig::KeepAlive => "keep-alive",
            CommandConfig::Snapshot => "snapshot",
            CommandConfig::Custom { .. } => "custom",
        }
    }

    /// The command to submit and the data buffer it needs, if any
    ///
    /// `None` for snapshots, which are stamped at submission time by
    /// `create_snapshot`.
    pub fn build(&self) -> Option<(NvmeCmd, Option<DmaBuf>)> {
        match *self {
            CommandConfig::Identify => Some((
                NvmeCmd::identify_controller(),
                Some(DmaBuf::new(IDENTIFY_DATA_LEN)),
            )),
            CommandConfig::KeepAlive => Some((NvmeCmd::new(admin_opc::KEEP_ALIVE), None)),
            CommandConfig::Snapshot => None,
            CommandConfig::Custom {
                opcode,
                cdw10,
                cdw11,
            } => Some((
                NvmeCmd::new(opcode).with_cdw10(cdw10).with_cdw11(cdw11),
                None,
            )),
        }
    }
}

pub struct AdminRunner {
    config: ChannelConfig,
    channel: LoopbackChannel,
    device: Device,
    records: Rc<RefCell<Vec<CompletionRecord>>>,
    retries: usize,
}

impl AdminRunner {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            config: config.clone(),
            channel: LoopbackChannel::new(config.id, config.pool_size),
            device: Device::open(&config.device, config.writable),
            records: Rc::new(RefCell::new(Vec::new())),
            retries: 0,
        }
    }

    fn submit(&self, seq: usize, command: &CommandConfig) -> spdk_bridge::Result<()> {
        let name = command.name();
        let records = self.records.clone();

        let Some((cmd, buffer)) = command.build() else {
            let stamp = create_snapshot(&self.device, &self.channel, move |cpl| {
                let record = CompletionRecord::capture(seq, name, admin_opc::CREATE_SNAPSHOT, &cpl);
                records.borrow_mut().push(record);
            })?;
            log::debug!("Snapshot command #{} stamped {}", seq, stamp);
            return Ok(());
        };
        let opcode = cmd.opc();

        nvme_admin(&self.device, &self.channel, &cmd, buffer, move |cpl, buf| {
            let mut record = CompletionRecord::capture(seq, name, opcode, &cpl);
            if opcode == admin_opc::IDENTIFY && record.succeeded {
                record.identify = buf.and_then(|b| IdentifyController::parse(b.as_slice()));
            }
            records.borrow_mut().push(record);
        })
    }

    /// Queue `command`, polling for a free slot if the pool is exhausted
    pub fn queue(&mut self, seq: usize, command: &CommandConfig) -> Result<()> {
        loop {
            match self.submit(seq, command) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    self.retries += 1;
                    log::debug!("{}; polling before retrying command {}", e, seq);
                    if self.channel.poll() == 0 {
                        bail!("channel {} is exhausted with nothing in flight", self.config.id);
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to submit {} command #{}", command.name(), seq)
                    })
                }
            }
        }
    }

    /// Poll until every queued command has completed
    pub fn drain(&self) -> usize {
        let mut completed = 0;
        while self.channel.pending() > 0 {
            completed += self.channel.poll();
        }
        completed
    }

    pub fn run(mut self, commands: &[CommandConfig]) -> Result<AdminReport> {
        log::info!(
            "Sending {} admin command(s) to {} over channel {}",
            commands.len(),
            self.device.name(),
            self.config.id
        );

        for (seq, command) in commands.iter().enumerate() {
            self.queue(seq, command)?;
        }
        self.drain();

        let mut completions = self.records.take();
        completions.sort_by_key(|c| c.seq);

        Ok(AdminReport {
            generated_at: Utc::now(),
            bridge_version: spdk_bridge::VERSION.to_string(),
            channel: self.config.id,
            device: self.config.device.clone(),
            pool_size: self.config.pool_size,
            retries: self.retries,
            completions,
        })
    }
}
