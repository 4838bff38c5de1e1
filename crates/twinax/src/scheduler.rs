//! The session multiplexer and poll scheduler
//!
//! A single cooperative loop owns the serial link and rotates among the
//! configured stations. The 5250 line is strict request/response, so at any
//! moment at most one station has a record in flight; inbound events are
//! routed to that station until its end-of-transmission marker arrives.
//! Errors never cross stations; only serial-link failures are fatal.

use crate::config::Config;
use crate::serial::SerialLink;
use crate::session::Session;
use crate::ConverterError;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use twinax_pty::PtyChild;
use twinax_station::{
    Action, EngineEvent, EngineState, StationEngine, COMMAND_BACKLOG_MAX,
};
use twinax_wire::{WireError, WireEvent};

/// Scheduler pass pacing when the serial link is quiet.
const TICK_INTERVAL: Duration = Duration::from_micros(500);

/// How long a hung-up child gets before SIGKILL.
const DETACH_GRACE: Duration = Duration::from_secs(2);

struct Slot {
    engine: StationEngine,
    session: Option<Session>,
}

struct Dying {
    child: PtyChild,
    deadline: Instant,
    killed: bool,
}

/// The converter core: all stations, their sessions, and the link.
pub struct Scheduler {
    config: Config,
    link: SerialLink,
    slots: Vec<Slot>,
    /// Round-robin start position for the next transmit pick.
    rotate: usize,
    /// Index of the slot whose record is in flight on the link.
    active: Option<usize>,
    reaping: Vec<Dying>,
}

impl Scheduler {
    pub fn new(config: Config, link: SerialLink) -> Result<Self, ConverterError> {
        config.validate()?;

        let slots = config
            .stations
            .iter()
            .map(|station| {
                let mut engine = StationEngine::new(
                    station.address,
                    station.cadence,
                    !config.clicker_silent,
                );
                if station.advanced_indicators {
                    engine = engine.with_advanced_indicators();
                }
                Slot {
                    engine,
                    session: None,
                }
            })
            .collect();

        Ok(Self {
            config,
            link,
            slots,
            rotate: 0,
            active: None,
            reaping: Vec::new(),
        })
    }

    /// Drive the converter until a fatal error.
    pub async fn run(&mut self) -> Result<(), ConverterError> {
        info!(
            stations = self.slots.len(),
            device = %self.config.serial_device.display(),
            "converter running"
        );
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.link.readable() => {}
            }
            self.step(Instant::now()).await?;
        }
    }

    /// One cooperative pass. Public so the whole stack can be driven
    /// without hardware in tests.
    pub async fn step(&mut self, now: Instant) -> Result<(), ConverterError> {
        self.drain_serial()?;
        self.check_deadlines(now);
        self.transmit(now).await?;
        self.pump_sessions(now)?;
        self.reap(now);
        Ok(())
    }

    pub fn station_state(&self, address: u8) -> Option<EngineState> {
        self.slot_index(address).map(|i| self.slots[i].engine.state())
    }

    pub fn has_session(&self, address: u8) -> bool {
        self.slot_index(address)
            .map(|i| self.slots[i].session.is_some())
            .unwrap_or(false)
    }

    /// Screen snapshot accessor for the admin seam.
    pub fn session_screen(&self, address: u8) -> Option<&twinax_display::Screen> {
        let i = self.slot_index(address)?;
        self.slots[i].session.as_ref().map(|s| s.display().screen())
    }

    /// Explicitly detach a station: final clear, then hangup-kill the child.
    pub fn detach(&mut self, address: u8, now: Instant) {
        if let Some(i) = self.slot_index(address) {
            self.slots[i].engine.detach();
            self.teardown_session(i, now);
            if self.active == Some(i) {
                self.active = None;
            }
        }
    }

    /// Detach followed by attach with the same configuration.
    pub fn restart(&mut self, address: u8, now: Instant) {
        self.detach(address, now);
        // the next clean poll response re-runs initialization
    }

    fn slot_index(&self, address: u8) -> Option<usize> {
        self.config
            .stations
            .iter()
            .position(|s| s.address == address)
    }

    fn drain_serial(&mut self) -> Result<(), ConverterError> {
        // serial failures are the one global-fatal condition
        self.link.read_available().map_err(ConverterError::Serial)?;

        loop {
            match self.link.next_event() {
                Ok(Some(WireEvent::Word { b1, b2 })) => match self.active {
                    Some(i) => self.slots[i].engine.on_word(b1, b2),
                    None => debug!(target: "wire", b1, b2, "word outside any turn dropped"),
                },
                Ok(Some(WireEvent::EndOfTransmission)) => {
                    if let Some(i) = self.active {
                        let engine = &mut self.slots[i].engine;
                        engine.on_transmission_complete();
                        if !engine.mid_burst() {
                            self.active = None;
                        }
                    }
                }
                Ok(Some(WireEvent::Debug(line))) => debug!(target: "wire", "{line}"),
                Ok(None) => return Ok(()),
                Err(WireError::MalformedFrame(len)) => {
                    warn!(target: "wire", len, "malformed frame skipped");
                }
                Err(e) => {
                    warn!(target: "wire", "inbound decode error: {e}");
                }
            }
        }
    }

    fn check_deadlines(&mut self, now: Instant) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.engine.check_deadline(now);
            if self.active == Some(i)
                && !slot.engine.awaiting_response()
                && !slot.engine.mid_burst()
            {
                self.active = None;
            }
        }
    }

    /// Transmit at most one record. A station mid-burst keeps the link
    /// until its burst completes, so bursts stay atomic on the wire.
    async fn transmit(&mut self, now: Instant) -> Result<(), ConverterError> {
        if let Some(i) = self.active {
            if let Some(action) = self.slots[i].engine.tick(now) {
                self.send(i, action).await?;
            }
            return Ok(());
        }

        for offset in 0..self.slots.len() {
            let i = (self.rotate + offset) % self.slots.len();
            if let Some(action) = self.slots[i].engine.tick(now) {
                self.rotate = (i + 1) % self.slots.len();
                self.active = Some(i);
                self.send(i, action).await?;
                return Ok(());
            }
        }
        Ok(())
    }

    async fn send(&mut self, index: usize, action: Action) -> Result<(), ConverterError> {
        let address = self.slots[index].engine.address();
        match &action {
            Action::Poll(record) => {
                debug!(target: "wire", station = address, len = record.len(), "poll")
            }
            Action::Command(record) => {
                debug!(target: "wire", station = address, len = record.len(), "command")
            }
        }
        self.link
            .send_record(action.record())
            .await
            .map_err(ConverterError::Serial)
    }

    fn pump_sessions(&mut self, now: Instant) -> Result<(), ConverterError> {
        for i in 0..self.slots.len() {
            for event in self.slots[i].engine.take_events() {
                match &event {
                    EngineEvent::SessionUp => {
                        let station = &self.config.stations[i];
                        info!(station = station.address, "terminal ready, starting session");
                        // losing the PTY pool is one of the few fatal errors
                        let session = Session::spawn(station, &self.config)?;
                        if self.slots[i].session.is_some() {
                            self.teardown_session(i, now);
                        }
                        self.slots[i].session = Some(session);
                    }
                    EngineEvent::Offline(reason) => {
                        warn!(
                            station = self.config.stations[i].address,
                            ?reason,
                            "station offline"
                        );
                        self.teardown_session(i, now);
                    }
                    other => {
                        let slot = &mut self.slots[i];
                        if let Some(session) = slot.session.as_mut() {
                            session.handle_engine_event(other, &mut slot.engine);
                        }
                    }
                }
            }

            let slot = &mut self.slots[i];
            let mut dead = false;
            if let Some(session) = slot.session.as_mut() {
                if slot.engine.backlog() < COMMAND_BACKLOG_MAX && !session.pump_child_output() {
                    dead = true;
                }
                if !dead {
                    if let Err(e) = session.flush_child_input() {
                        debug!(
                            station = session.address(),
                            "pty write failed, detaching: {e}"
                        );
                        dead = true;
                    }
                }
                if !dead {
                    session.sync_display(&mut slot.engine);
                    dead = session.child_exited();
                }
            }

            if dead {
                let address = self.config.stations[i].address;
                info!(station = address, "login process gone, detaching");
                self.slots[i].engine.detach();
                self.teardown_session(i, now);
            }
        }
        Ok(())
    }

    fn teardown_session(&mut self, index: usize, now: Instant) {
        if let Some(session) = self.slots[index].session.take() {
            let child = session.into_child();
            let _ = child.hangup();
            self.reaping.push(Dying {
                child,
                deadline: now + DETACH_GRACE,
                killed: false,
            });
        }
    }

    fn reap(&mut self, now: Instant) {
        self.reaping.retain_mut(|dying| {
            match dying.child.try_wait() {
                Ok(Some(_)) | Err(_) => return false,
                Ok(None) => {}
            }
            if now >= dying.deadline && !dying.killed {
                let _ = dying.child.kill();
                dying.killed = true;
            }
            true
        });
    }
}
