//! The per-station protocol state machine
//!
//! The engine owns everything about one terminal's conversation: when to
//! poll, how to initialize a freshly detected tube, how to turn dirty screen
//! spans into 5250 write bursts, and when to give a terminal up for dead.
//! It is driven entirely by `tick` plus routed-back wire events and never
//! blocks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use twinax_wire::{
    cmd, encode_command, encode_poll, inbound_word, pair_parity, scancode_from_pair, StatusWord,
};

/// Consecutive poll misses before a station is declared gone.
const MISS_THRESHOLD: u32 = 8;

/// Consecutive inbound parity failures tolerated before a station reset.
const PARITY_THRESHOLD: u32 = 4;

/// Retransmissions of a burst record before giving up on the terminal.
const BURST_RETRIES: u32 = 3;

/// Full restarts of the initialization sequence before going offline.
const INIT_RETRIES: u32 = 3;

/// Data bytes per write-data frame; the terminal's command buffer is small.
const WRITE_CHUNK: usize = 10;

/// Pending record bound; above this the scheduler stops draining the PTY.
pub const COMMAND_BACKLOG_MAX: usize = 50;

/// Response deadline floor for stations polled continuously.
const POLL_TIMEOUT_FLOOR: Duration = Duration::from_millis(100);

/// Deadline multiplier over the poll interval.
const POLL_DEADLINE_FACTOR: u32 = 8;

// status byte bits
const STATUS_HIDE_CURSOR: u8 = 0x80;
const STATUS_RESET_EXCEPTION: u8 = 0x04;
const STATUS_CLICKER_OFF: u8 = 0x02;
const STATUS_BELL: u8 = 0x01;

// indicator byte bits
const INDICATOR_CAPS: u8 = 0x20;

/// Poll pacing for one station, fixed between attach and reattach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence(Duration);

impl PollCadence {
    /// Poll as fast as the link allows; real 5251 hardware keeps up.
    pub const NORMAL: PollCadence = PollCadence(Duration::ZERO);

    /// Emulated terminals want breathing room between polls.
    pub const SLOW: PollCadence = PollCadence(Duration::from_micros(5_000));

    /// Debug pace, one poll a second.
    pub const VERY_SLOW: PollCadence = PollCadence(Duration::from_micros(1_000_000));

    pub fn from_micros(us: u64) -> Self {
        PollCadence(Duration::from_micros(us))
    }

    pub fn interval(&self) -> Duration {
        self.0
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unattached,
    Initializing(InitStep),
    Ready,
    Writing,
    Draining,
}

/// Initialization progress. Each step is one command burst; `Confirm` waits
/// for the first clean poll status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    ResetAndSetMode,
    QueryKeyboardId,
    EnableAndClear,
    Confirm,
}

/// Why a station fell back to `Unattached` (or restarted initialization).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineReason {
    PollTimeout,
    WriteFailed,
    ParityErrors,
    InitFailed,
    TerminalReset,
}

/// What the engine wants transmitted this turn: exactly one serial record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Poll(Vec<u8>),
    Command(Vec<u8>),
}

impl Action {
    pub fn record(&self) -> &[u8] {
        match self {
            Action::Poll(r) | Action::Command(r) => r,
        }
    }
}

/// Events surfaced to the session layer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Initialization finished; spawn the login shell.
    SessionUp,

    /// A keystroke scancode for the session decoder.
    Scancode(u8),

    /// Terminal condition changed; feeds the status line.
    Status {
        busy: bool,
        exception: u8,
        outstanding: bool,
    },

    /// The station went offline (or back to initialization); tear the
    /// session down.
    Offline(OfflineReason),
}

/// One run of screen cells to transmit, already in EBCDIC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenWrite {
    pub row: u16,
    pub col: u16,
    pub data: Vec<u8>,
}

#[derive(Debug)]
enum Outstanding {
    Poll {
        deadline: Instant,
    },
    Burst {
        queue: VecDeque<Vec<u8>>,
        current: Option<Vec<u8>>,
        resend: bool,
        deadline: Instant,
    },
}

/// The protocol engine for one station address.
#[derive(Debug)]
pub struct StationEngine {
    address: u8,
    cadence: PollCadence,
    advanced_indicators: bool,

    state: EngineState,
    initialized: bool,
    outstanding: Option<Outstanding>,
    rx_words: Vec<(u8, u8)>,
    last_poll_at: Option<Instant>,

    ack_pending: bool,
    busy: bool,
    line_parity: bool,
    response_level: bool,
    last_status: Option<(bool, u8, bool)>,

    miss_count: u32,
    parity_errors: u32,
    burst_retries: u32,
    init_retries: u32,

    pending: VecDeque<Vec<Vec<u8>>>,
    open_seq: Vec<Vec<u8>>,

    status_byte: u8,
    indicators_byte: u8,
    clicker_enabled: bool,

    events: VecDeque<EngineEvent>,
}

impl StationEngine {
    pub fn new(address: u8, cadence: PollCadence, clicker_enabled: bool) -> Self {
        assert!(address <= 6, "station address out of range");
        let mut engine = Self {
            address,
            cadence,
            advanced_indicators: false,
            state: EngineState::Unattached,
            initialized: false,
            outstanding: None,
            rx_words: Vec::new(),
            last_poll_at: None,
            ack_pending: false,
            busy: false,
            line_parity: false,
            response_level: false,
            last_status: None,
            miss_count: 0,
            parity_errors: 0,
            burst_retries: 0,
            init_retries: 0,
            pending: VecDeque::new(),
            open_seq: Vec::new(),
            status_byte: 0,
            indicators_byte: 0,
            clicker_enabled,
            events: VecDeque::new(),
        };
        if !clicker_enabled {
            engine.status_byte |= STATUS_CLICKER_OFF;
        }
        engine
    }

    /// Indicator handling for the 3476/3477 family, which grew a dedicated
    /// indicators command.
    pub fn with_advanced_indicators(mut self) -> Self {
        self.advanced_indicators = true;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn cadence(&self) -> PollCadence {
        self.cadence
    }

    pub fn clicker_enabled(&self) -> bool {
        self.clicker_enabled
    }

    pub fn backlog(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    /// True while a write burst owns the serial link for this station.
    pub fn mid_burst(&self) -> bool {
        matches!(self.outstanding, Some(Outstanding::Burst { .. }))
    }

    /// True while a record is in flight awaiting its transmission-complete
    /// marker.
    pub fn awaiting_response(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    /// Decide this station's next transmission, if any.
    pub fn tick(&mut self, now: Instant) -> Option<Action> {
        let response_deadline = self.response_deadline();
        match &mut self.outstanding {
            Some(Outstanding::Poll { .. }) => None,
            Some(Outstanding::Burst {
                queue,
                current,
                resend,
                deadline,
            }) => {
                if *resend {
                    *resend = false;
                    *deadline = now + response_deadline;
                    return current.clone().map(Action::Command);
                }
                if current.is_none() {
                    if let Some(rec) = queue.pop_front() {
                        *current = Some(rec.clone());
                        *deadline = now + response_deadline;
                        return Some(Action::Command(rec));
                    }
                }
                None
            }
            None => {
                // a responsive, non-busy terminal unblocks queued bursts
                if !self.busy && self.last_status.is_some() && !self.pending.is_empty() {
                    let mut queue = VecDeque::new();
                    while let Some(seq) = self.pending.pop_front() {
                        queue.extend(seq);
                    }
                    if self.state == EngineState::Ready {
                        self.state = EngineState::Writing;
                    }
                    self.burst_retries = 0;
                    self.outstanding = Some(Outstanding::Burst {
                        queue,
                        current: None,
                        resend: false,
                        deadline: now,
                    });
                    return self.tick(now);
                }

                if !self.poll_due(now) {
                    return None;
                }
                self.last_poll_at = Some(now);
                let command = if self.ack_pending { cmd::ACK } else { cmd::POLL };
                self.ack_pending = false;
                let record = encode_poll(command, self.address, self.line_parity)
                    .expect("validated station address");
                self.outstanding = Some(Outstanding::Poll {
                    deadline: now + response_deadline,
                });
                Some(Action::Poll(record))
            }
        }
    }

    /// Route one inbound frame while this station owns the link.
    pub fn on_word(&mut self, b1: u8, b2: u8) {
        self.rx_words.push((b1, b2));
    }

    /// The firmware reported our burst on the wire; close out the turn.
    pub fn on_transmission_complete(&mut self) {
        let words = std::mem::take(&mut self.rx_words);
        match self.outstanding.take() {
            Some(Outstanding::Poll { .. }) => self.process_poll_response(&words),
            Some(Outstanding::Burst {
                queue,
                current,
                deadline,
                ..
            }) => {
                if current.is_some() {
                    self.burst_retries = 0;
                    if let (EngineState::Initializing(InitStep::QueryKeyboardId), Some(&(b1, b2))) =
                        (self.state, words.first())
                    {
                        // logged only; layout selection is configuration
                        debug!(
                            target: "station",
                            station = self.address,
                            id = inbound_word(b1, b2),
                            "keyboard identification"
                        );
                    }
                }
                if queue.is_empty() {
                    self.finish_burst();
                } else {
                    self.outstanding = Some(Outstanding::Burst {
                        queue,
                        current: None,
                        resend: false,
                        deadline,
                    });
                }
            }
            None => {
                if !words.is_empty() {
                    debug!(target: "station", station = self.address, "unsolicited response dropped");
                }
            }
        }
    }

    /// Resolve an expired response deadline, if one passed.
    pub fn check_deadline(&mut self, now: Instant) {
        let timed_out = match &self.outstanding {
            Some(Outstanding::Poll { deadline })
            | Some(Outstanding::Burst {
                current: Some(_),
                deadline,
                ..
            }) => now >= *deadline,
            _ => false,
        };
        if !timed_out {
            return;
        }

        self.rx_words.clear();
        match self.outstanding.take() {
            Some(Outstanding::Poll { .. }) => {
                self.miss_count += 1;
                if self.state != EngineState::Unattached && self.miss_count >= MISS_THRESHOLD {
                    warn!(target: "station", station = self.address, "terminal disconnected");
                    self.go_offline(OfflineReason::PollTimeout);
                }
            }
            Some(Outstanding::Burst {
                queue,
                current,
                deadline,
                ..
            }) => {
                self.burst_retries += 1;
                if self.burst_retries > BURST_RETRIES {
                    self.go_offline(OfflineReason::WriteFailed);
                } else {
                    self.outstanding = Some(Outstanding::Burst {
                        queue,
                        current,
                        resend: true,
                        deadline,
                    });
                }
            }
            None => {}
        }
    }

    /// Begin detach: flush a final clear so the tube is left blank.
    pub fn detach(&mut self) {
        self.pending.clear();
        self.open_seq.clear();
        if self.initialized {
            self.state = EngineState::Draining;
            self.queue_clear_screen();
        } else {
            self.reset();
        }
    }

    /// Drop all protocol state back to `Unattached`.
    pub fn reset(&mut self) {
        let clicker = self.clicker_enabled;
        let cadence = self.cadence;
        let advanced = self.advanced_indicators;
        let events = std::mem::take(&mut self.events);
        *self = Self::new(self.address, cadence, clicker);
        self.advanced_indicators = advanced;
        self.events = events;
    }

    // --- session-facing command queues ---

    /// Queue a display update burst: reposition, write each span, then park
    /// the hardware cursor at the session cursor.
    pub fn queue_screen_write(&mut self, writes: &[ScreenWrite], cursor: (u16, u16)) {
        if !self.initialized || writes.is_empty() {
            return;
        }
        for write in writes {
            let pos = position(write.row, write.col);
            self.push_command(cmd::LOAD_CURSOR_REGISTER, &pos);
            self.push_command(cmd::LOAD_ADDRESS_COUNTER, &pos);
            for chunk in write.data.chunks(WRITE_CHUNK) {
                let mut framed = Vec::with_capacity(chunk.len() + 1);
                framed.push(chunk.len() as u8);
                framed.extend_from_slice(chunk);
                self.push_command(cmd::WRITE_DATA_LOAD_CURSOR, &framed);
            }
        }
        self.queue_cursor_move(cursor.0, cursor.1);
    }

    /// Park the cursor without any cell updates.
    pub fn queue_cursor_move(&mut self, row: u16, col: u16) {
        if !self.initialized {
            return;
        }
        let pos = position(row, col);
        self.push_command(cmd::LOAD_CURSOR_REGISTER, &pos);
        self.push_command(cmd::LOAD_ADDRESS_COUNTER, &pos);
        self.close_seq();
    }

    /// Rewrite the status row (the 25th line) and restore the address
    /// counter to the session cursor.
    pub fn queue_status_row(&mut self, row: &[u8], cursor: (u16, u16)) {
        if !self.initialized {
            return;
        }
        self.push_command(cmd::LOAD_ADDRESS_COUNTER, &position(24, 0));
        for chunk in row.chunks(WRITE_CHUNK) {
            let mut framed = Vec::with_capacity(chunk.len() + 1);
            framed.push(chunk.len() as u8);
            framed.extend_from_slice(chunk);
            self.push_command(cmd::WRITE_DATA_LOAD_CURSOR, &framed);
        }
        self.push_command(cmd::LOAD_ADDRESS_COUNTER, &position(cursor.0, cursor.1));
        self.push_command(cmd::LOAD_CURSOR_REGISTER, &position(cursor.0, cursor.1));
        self.close_seq();
    }

    /// Toggle the keyboard clicker solenoid.
    pub fn set_clicker(&mut self, enabled: bool) {
        self.clicker_enabled = enabled;
        if enabled {
            self.status_byte &= !STATUS_CLICKER_OFF;
        } else {
            self.status_byte |= STATUS_CLICKER_OFF;
        }
        self.queue_status_byte();
    }

    /// One audible pulse, when the clicker is enabled.
    pub fn ring_bell(&mut self) {
        if !self.initialized || !self.clicker_enabled {
            return;
        }
        self.push_command(cmd::WRITE_CONTROL_DATA, &[self.status_byte | STATUS_BELL]);
        self.close_seq();
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        if visible {
            self.status_byte &= !STATUS_HIDE_CURSOR;
        } else {
            self.status_byte |= STATUS_HIDE_CURSOR;
        }
        self.queue_status_byte();
    }

    /// Drive the caps-lock light.
    pub fn set_caps_indicator(&mut self, on: bool) {
        if !self.initialized {
            return;
        }
        if self.advanced_indicators {
            let value = if on { 0x80 } else { 0x00 };
            self.push_command(cmd::WRITE_CONTROL_DATA_INDICATORS, &[value]);
        } else {
            if on {
                self.indicators_byte |= INDICATOR_CAPS;
            } else {
                self.indicators_byte &= !INDICATOR_CAPS;
            }
            self.push_command(
                cmd::WRITE_DATA_LOAD_CURSOR_INDICATORS,
                &[self.indicators_byte],
            );
        }
        self.close_seq();
    }

    // --- internals ---

    fn process_poll_response(&mut self, words: &[(u8, u8)]) {
        let Some(&(b1, b2)) = words.first() else {
            // null response: the terminal had nothing to say
            return;
        };

        let status = StatusWord::from_pair(b1, b2);
        self.miss_count = 0;
        self.ack_pending = true;
        self.busy = status.busy;
        self.line_parity = status.line_parity;

        let snapshot = (status.busy, status.exception, status.outstanding);
        if self.last_status != Some(snapshot) {
            self.last_status = Some(snapshot);
            self.events.push_back(EngineEvent::Status {
                busy: status.busy,
                exception: status.exception,
                outstanding: status.outstanding,
            });
        }

        match self.state {
            EngineState::Unattached => {
                debug!(target: "station", station = self.address, "terminal detected");
                self.begin_init(InitStep::ResetAndSetMode);
            }
            EngineState::Initializing(InitStep::Confirm) => {
                if status.exception == 0 && !status.busy {
                    self.state = EngineState::Ready;
                    self.initialized = true;
                    self.init_retries = 0;
                    self.events.push_back(EngineEvent::SessionUp);
                } else if status.needs_init() {
                    self.init_retries += 1;
                    if self.init_retries > INIT_RETRIES {
                        self.go_offline(OfflineReason::InitFailed);
                    } else {
                        self.begin_init(InitStep::ResetAndSetMode);
                    }
                }
            }
            EngineState::Initializing(_) => {}
            EngineState::Ready | EngineState::Writing => {
                if status.needs_init() && words.len() < 2 {
                    // the terminal lost power and came back raw
                    self.events
                        .push_back(EngineEvent::Offline(OfflineReason::TerminalReset));
                    self.initialized = false;
                    self.pending.clear();
                    self.open_seq.clear();
                    self.begin_init(InitStep::ResetAndSetMode);
                    return;
                }
                if status.exception != 0 {
                    warn!(
                        target: "station",
                        station = self.address,
                        exception = status.exception,
                        "terminal exception"
                    );
                    self.push_command(
                        cmd::WRITE_CONTROL_DATA,
                        &[self.status_byte | STATUS_RESET_EXCEPTION],
                    );
                    self.close_seq();
                } else if let Some(&(d1, d2)) = words.get(1) {
                    self.process_data_word(status, d1, d2);
                }
            }
            EngineState::Draining => {}
        }
    }

    fn process_data_word(&mut self, status: StatusWord, d1: u8, d2: u8) {
        if pair_parity(d1, d2) != status.line_parity {
            self.parity_errors += 1;
            warn!(target: "station", station = self.address, "inbound parity error");
            if self.parity_errors > PARITY_THRESHOLD {
                self.go_offline(OfflineReason::ParityErrors);
            }
            return;
        }
        self.parity_errors = 0;

        let scancode = scancode_from_pair(d1, d2);
        if self.response_level != status.response_level && scancode != 0x00 && scancode != 0xFF {
            self.events.push_back(EngineEvent::Scancode(scancode));
        }
        self.response_level = status.response_level;
    }

    fn begin_init(&mut self, step: InitStep) {
        self.state = EngineState::Initializing(step);
        self.pending.clear();
        self.open_seq.clear();
        match step {
            InitStep::ResetAndSetMode => {
                self.push_command(cmd::RESET, &[]);
                self.push_command(cmd::SET_MODE, &[0]);
                self.close_seq();
            }
            InitStep::QueryKeyboardId => {
                self.push_command(cmd::READ_REGISTERS, &[]);
                self.close_seq();
            }
            InitStep::EnableAndClear => {
                self.push_command(cmd::WRITE_CONTROL_DATA, &[self.status_byte]);
                self.queue_clear_screen();
            }
            InitStep::Confirm => {}
        }
    }

    fn finish_burst(&mut self) {
        self.outstanding = None;
        match self.state {
            EngineState::Writing => self.state = EngineState::Ready,
            EngineState::Initializing(step) => {
                let next = match step {
                    InitStep::ResetAndSetMode => InitStep::QueryKeyboardId,
                    InitStep::QueryKeyboardId => InitStep::EnableAndClear,
                    InitStep::EnableAndClear | InitStep::Confirm => InitStep::Confirm,
                };
                if next == InitStep::Confirm {
                    self.state = EngineState::Initializing(InitStep::Confirm);
                } else {
                    self.begin_init(next);
                }
            }
            EngineState::Draining => {
                debug!(target: "station", station = self.address, "drain complete");
                self.reset();
            }
            _ => {}
        }
    }

    fn go_offline(&mut self, reason: OfflineReason) {
        self.events.push_back(EngineEvent::Offline(reason));
        self.reset();
    }

    fn queue_clear_screen(&mut self) {
        self.push_command(cmd::LOAD_ADDRESS_COUNTER, &position(0, 0));
        self.push_command(cmd::LOAD_REFERENCE_COUNTER, &position(23, 79));
        self.push_command(cmd::CLEAR, &[]);
        self.push_command(cmd::LOAD_CURSOR_REGISTER, &position(0, 0));
        self.push_command(cmd::LOAD_ADDRESS_COUNTER, &position(0, 0));
        self.close_seq();
    }

    fn queue_status_byte(&mut self) {
        if !self.initialized {
            return;
        }
        self.push_command(cmd::WRITE_CONTROL_DATA, &[self.status_byte]);
        self.close_seq();
    }

    fn push_command(&mut self, command: u8, data: &[u8]) {
        let record =
            encode_command(command, self.address, data).expect("validated station address");
        self.open_seq.push(record);
    }

    /// Close the open command sequence with EOQ; it becomes one atomic burst.
    fn close_seq(&mut self) {
        if self.open_seq.is_empty() {
            return;
        }
        let record =
            encode_command(cmd::EOQ, self.address, &[]).expect("validated station address");
        self.open_seq.push(record);
        let seq = std::mem::take(&mut self.open_seq);
        self.pending.push_back(seq);
    }

    fn poll_due(&self, now: Instant) -> bool {
        let interval = match self.state {
            // a missing terminal is probed at the nominal rate
            EngineState::Unattached => Duration::ZERO,
            _ => self.cadence.interval(),
        };
        match self.last_poll_at {
            Some(last) => now.duration_since(last) >= interval,
            None => true,
        }
    }

    fn response_deadline(&self) -> Duration {
        (self.cadence.interval() * POLL_DEADLINE_FACTOR).max(POLL_TIMEOUT_FLOOR)
    }
}

/// Regen-buffer address of a cell, row-major.
fn position(row: u16, col: u16) -> [u8; 2] {
    (row * 80 + col).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    // build the serial pair that decodes to the given 11-bit status word
    fn status_pair(w: u16) -> (u8, u8) {
        let a = ((w & 0x3F) as u8).reverse_bits() >> 2;
        let b = (((w >> 6) & 0x1F) as u8).reverse_bits() >> 3;
        (0x40 | a, 0x40 | b)
    }

    fn status_word(
        busy: bool,
        exception: u8,
        response_level: bool,
        line_parity: bool,
    ) -> u16 {
        ((busy as u16) << 7)
            | ((line_parity as u16) << 6)
            | ((exception as u16) << 1)
            | response_level as u16
    }

    // build the serial pair that decodes to the given scancode
    fn scancode_pair(scan: u8) -> (u8, u8) {
        let b1 = 0x40 | ((scan & 0x3F).reverse_bits() >> 2);
        let b2 = 0x40 | (((scan >> 7) & 1) << 3) | (((scan >> 6) & 1) << 4);
        (b1, b2)
    }

    fn engine() -> StationEngine {
        StationEngine::new(0, PollCadence::NORMAL, true)
    }

    // complete one host->terminal exchange: take the action, feed the reply
    // words, then EOTX
    fn exchange(eng: &mut StationEngine, now: Instant, reply: &[(u8, u8)]) -> Option<Action> {
        let action = eng.tick(now)?;
        for &(b1, b2) in reply {
            eng.on_word(b1, b2);
        }
        eng.on_transmission_complete();
        Some(action)
    }

    fn drive_to_ready(eng: &mut StationEngine, now: &mut Instant) {
        let detect = status_pair(status_word(false, 7, false, false));
        let clean = status_pair(status_word(false, 0, false, false));

        // detection poll
        let action = exchange(eng, *now, &[detect]).unwrap();
        assert!(matches!(action, Action::Poll(_)));

        // at most six poll round trips to reach Ready
        let mut polls = 0;
        let mut idle = 0;
        while eng.state() != EngineState::Ready {
            match eng.tick(*now) {
                Some(Action::Command(_)) => eng.on_transmission_complete(),
                Some(Action::Poll(_)) => {
                    polls += 1;
                    assert!(polls <= 6, "init took too many poll round trips");
                    let (b1, b2) = clean;
                    eng.on_word(b1, b2);
                    eng.on_transmission_complete();
                }
                None => {
                    // waiting out the poll cadence
                    idle += 1;
                    assert!(idle < 100, "engine stalled during init");
                    *now += Duration::from_millis(10);
                }
            }
        }
    }

    #[test]
    fn test_cold_attach_reaches_ready() {
        let mut eng = engine();
        let mut now = Instant::now();
        assert_eq!(eng.state(), EngineState::Unattached);

        drive_to_ready(&mut eng, &mut now);

        let events = eng.take_events();
        assert!(events.contains(&EngineEvent::SessionUp));
        // the detection status was surfaced for the status line
        assert!(matches!(events[0], EngineEvent::Status { exception: 7, .. }));
    }

    #[test]
    fn test_init_commands_start_with_reset_and_set_mode() {
        let mut eng = engine();
        let now = Instant::now();
        let detect = status_pair(status_word(false, 7, false, false));
        exchange(&mut eng, now, &[detect]).unwrap();

        let first = eng.tick(now).unwrap();
        let reset = encode_command(cmd::RESET, 0, &[]).unwrap();
        assert_eq!(first.record(), &reset[..]);
        eng.on_transmission_complete();

        let second = eng.tick(now).unwrap();
        let set_mode = encode_command(cmd::SET_MODE, 0, &[0]).unwrap();
        assert_eq!(second.record(), &set_mode[..]);
    }

    #[test]
    fn test_keystroke_delivery() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        let (d1, d2) = scancode_pair(0x23);
        let parity = pair_parity(d1, d2);
        // response level flips when a new keystroke is waiting
        let status = status_pair(status_word(false, 0, true, parity));

        exchange(&mut eng, now, &[status, (d1, d2)]).unwrap();
        assert_eq!(eng.take_events(), vec![EngineEvent::Scancode(0x23)]);

        // the same response level again does not repeat the keystroke
        exchange(&mut eng, now, &[status, (d1, d2)]).unwrap();
        assert_eq!(eng.take_events(), vec![]);
    }

    #[test]
    fn test_write_burst_is_atomic() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);

        eng.queue_screen_write(
            &[ScreenWrite {
                row: 0,
                col: 0,
                data: vec![0xC8, 0xC9],
            }],
            (0, 2),
        );
        assert!(eng.backlog() > 0);

        // burst records flow without any poll until the queue drains
        let mut records = 0;
        loop {
            match eng.tick(now) {
                Some(Action::Command(_)) => {
                    records += 1;
                    assert!(eng.mid_burst());
                    eng.on_transmission_complete();
                }
                Some(Action::Poll(_)) => panic!("poll interleaved into a write burst"),
                None => break,
            }
            if !eng.mid_burst() {
                break;
            }
        }
        // reposition (2) + data (1) + cursor park (2) + EOQ
        assert_eq!(records, 6);
        assert_eq!(eng.state(), EngineState::Ready);

        // next turn is a poll again
        assert!(matches!(eng.tick(now), Some(Action::Poll(_))));
    }

    #[test]
    fn test_poll_miss_threshold_goes_offline() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        for _ in 0..MISS_THRESHOLD {
            assert!(matches!(eng.tick(now), Some(Action::Poll(_))));
            now += Duration::from_secs(1);
            eng.check_deadline(now);
        }
        assert_eq!(eng.state(), EngineState::Unattached);
        assert!(eng
            .take_events()
            .contains(&EngineEvent::Offline(OfflineReason::PollTimeout)));
    }

    #[test]
    fn test_burst_retries_then_offline() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        eng.queue_cursor_move(5, 5);
        let first = eng.tick(now).unwrap();

        // the record is retried verbatim up to three times
        for _ in 0..BURST_RETRIES {
            now += Duration::from_secs(1);
            eng.check_deadline(now);
            let retry = eng.tick(now).unwrap();
            assert_eq!(retry.record(), first.record());
        }
        now += Duration::from_secs(1);
        eng.check_deadline(now);
        assert_eq!(eng.state(), EngineState::Unattached);
        assert!(eng
            .take_events()
            .contains(&EngineEvent::Offline(OfflineReason::WriteFailed)));
    }

    #[test]
    fn test_parity_error_policy() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        let (d1, d2) = scancode_pair(0x23);
        let bad_parity = !pair_parity(d1, d2);

        for _ in 0..PARITY_THRESHOLD {
            let status = status_pair(status_word(false, 0, true, bad_parity));
            exchange(&mut eng, now, &[status, (d1, d2)]).unwrap();
            assert_eq!(eng.state(), EngineState::Ready);
        }
        // no keystrokes leaked through
        assert!(eng.take_events().iter().all(|e| !matches!(e, EngineEvent::Scancode(_))));

        let status = status_pair(status_word(false, 0, true, bad_parity));
        exchange(&mut eng, now, &[status, (d1, d2)]).unwrap();
        assert_eq!(eng.state(), EngineState::Unattached);
        assert!(eng
            .take_events()
            .contains(&EngineEvent::Offline(OfflineReason::ParityErrors)));
    }

    #[test]
    fn test_slow_cadence_spacing() {
        let mut eng = StationEngine::new(0, PollCadence::SLOW, true);
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);

        // land a poll at a known time
        let clean = status_pair(status_word(false, 0, false, false));
        let t0 = now + Duration::from_millis(10);
        match eng.tick(t0) {
            Some(Action::Poll(_)) => {
                let (b1, b2) = clean;
                eng.on_word(b1, b2);
                eng.on_transmission_complete();
            }
            other => panic!("expected a poll, got {other:?}"),
        }

        // too soon: the slow interval has not elapsed
        assert!(eng.tick(t0 + Duration::from_micros(1_000)).is_none());
        assert!(matches!(
            eng.tick(t0 + Duration::from_micros(5_100)),
            Some(Action::Poll(_))
        ));
    }

    #[test]
    fn test_terminal_power_cycle_restarts_init() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        let raw = status_pair(status_word(false, 7, false, false));
        exchange(&mut eng, now, &[raw]).unwrap();

        assert!(matches!(eng.state(), EngineState::Initializing(_)));
        assert!(eng
            .take_events()
            .contains(&EngineEvent::Offline(OfflineReason::TerminalReset)));
    }

    #[test]
    fn test_detach_drains_with_final_clear() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);

        eng.detach();
        assert_eq!(eng.state(), EngineState::Draining);

        while let Some(action) = eng.tick(now) {
            assert!(matches!(action, Action::Command(_)));
            eng.on_transmission_complete();
            if eng.state() == EngineState::Unattached {
                break;
            }
        }
        assert_eq!(eng.state(), EngineState::Unattached);
        assert_eq!(eng.backlog(), 0);
    }

    #[test]
    fn test_busy_terminal_defers_commands() {
        let mut eng = engine();
        let mut now = Instant::now();
        drive_to_ready(&mut eng, &mut now);
        eng.take_events();

        // the terminal reports busy before anything is queued
        let busy = status_pair(status_word(true, 0, false, false));
        exchange(&mut eng, now, &[busy]).unwrap();

        eng.queue_cursor_move(1, 1);
        // busy: the next turn polls instead of sending the queued commands
        assert!(matches!(eng.tick(now), Some(Action::Poll(_))));
        assert!(eng.backlog() > 0);

        // once the terminal is idle again the burst flows
        let (b1, b2) = status_pair(status_word(false, 0, false, false));
        eng.on_word(b1, b2);
        eng.on_transmission_complete();
        assert!(matches!(eng.tick(now), Some(Action::Command(_))));
    }
}
