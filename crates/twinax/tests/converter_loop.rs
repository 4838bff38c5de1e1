//! End-to-end converter tests against a simulated firmware.
//!
//! A PTY pair stands in for the USB serial device: the scheduler drives the
//! slave side while a thread plays the microcontroller on the master side,
//! answering polls with status words the way a 5251 would.

use nix::pty::openpty;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use twinax::{Config, Scheduler, SerialLink, StationConfig};
use twinax_station::EngineState;
use twinax_wire::{cmd, pair_parity};

/// Serial pairs for an 11-bit status word.
fn status_pair(w: u16) -> (u8, u8) {
    let a = ((w & 0x3F) as u8).reverse_bits() >> 2;
    let b = (((w >> 6) & 0x1F) as u8).reverse_bits() >> 3;
    (0x40 | a, 0x40 | b)
}

fn status_word(busy: bool, exception: u8, response_level: bool, line_parity: bool) -> u16 {
    ((busy as u16) << 7)
        | ((line_parity as u16) << 6)
        | ((exception as u16) << 1)
        | response_level as u16
}

/// Serial pair for a scancode data response.
fn scancode_pair(scan: u8) -> (u8, u8) {
    let b1 = 0x40 | ((scan & 0x3F).reverse_bits() >> 2);
    let b2 = 0x40 | (((scan >> 7) & 1) << 3) | (((scan >> 6) & 1) << 4);
    (b1, b2)
}

#[derive(Default)]
struct FirmwareState {
    /// Scancode queued for the next poll response.
    pending_key: Option<u8>,
    /// Records captured from the host, terminator stripped.
    records: Vec<Vec<u8>>,
}

struct Firmware {
    state: Arc<Mutex<FirmwareState>>,
    stop: Arc<AtomicBool>,
}

impl Firmware {
    /// Spawn the simulator on the master side of the pty pair.
    fn spawn(mut port: File) -> Self {
        let state = Arc::new(Mutex::new(FirmwareState::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_state = state.clone();
        let thread_stop = stop.clone();
        std::thread::spawn(move || {
            let mut configured = false;
            let mut level = false;
            let mut line = Vec::new();
            let mut buf = [0u8; 256];

            while !thread_stop.load(Ordering::Relaxed) {
                let n = match port.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for &byte in &buf[..n] {
                    if byte != b'\n' {
                        line.push(byte);
                        continue;
                    }
                    let record = std::mem::take(&mut line);
                    if record.is_empty() {
                        continue;
                    }

                    let command_low = record[0].wrapping_sub(0x40) & 0x3F;
                    let is_poll = command_low == cmd::POLL || command_low == cmd::ACK;
                    if command_low == cmd::SET_MODE {
                        configured = true;
                    }
                    thread_state.lock().unwrap().records.push(record);

                    let mut reply = Vec::new();
                    if is_poll {
                        let key = if configured {
                            thread_state.lock().unwrap().pending_key.take()
                        } else {
                            None
                        };
                        if let Some(scan) = key {
                            level = !level;
                            let (d1, d2) = scancode_pair(scan);
                            let (s1, s2) = status_pair(status_word(
                                false,
                                0,
                                level,
                                pair_parity(d1, d2),
                            ));
                            reply.extend_from_slice(&[s1, s2, d1, d2, b'\n']);
                        } else {
                            let exception = if configured { 0 } else { 7 };
                            let (s1, s2) =
                                status_pair(status_word(false, exception, level, false));
                            reply.extend_from_slice(&[s1, s2, b'\n']);
                        }
                    }
                    reply.extend_from_slice(b"[EOTX]\n");
                    if port.write_all(&reply).is_err() {
                        return;
                    }
                }
            }
        });

        Self { state, stop }
    }

    fn press_key(&self, scan: u8) {
        self.state.lock().unwrap().pending_key = Some(scan);
    }

    fn captured_records(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().records.clone()
    }
}

impl Drop for Firmware {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn test_config(shell: &str) -> Config {
    Config {
        serial_device: PathBuf::from("<pty>"),
        stations: vec![StationConfig::new(0)],
        clicker_silent: false,
        shell: PathBuf::from(shell),
        term_name: "vt52".to_string(),
        terminfo_dir: None,
    }
}

fn converter(shell: &str) -> (Scheduler, Firmware) {
    let pty = openpty(None, None).expect("openpty");
    let link = SerialLink::from_file(File::from(pty.slave)).expect("serial link");
    let firmware = Firmware::spawn(File::from(pty.master));
    let scheduler = Scheduler::new(test_config(shell), link).expect("scheduler");
    (scheduler, firmware)
}

async fn run_until(
    scheduler: &mut Scheduler,
    limit: Duration,
    mut done: impl FnMut(&Scheduler) -> bool,
) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        scheduler.step(Instant::now()).await.expect("scheduler step");
        if done(scheduler) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    false
}

#[tokio::test]
async fn cold_attach_brings_station_ready_and_spawns_shell() {
    let (mut scheduler, firmware) = converter("/bin/cat");

    let ready = run_until(&mut scheduler, Duration::from_secs(10), |s| {
        s.station_state(0) == Some(EngineState::Ready) && s.has_session(0)
    })
    .await;
    assert!(ready, "station never initialized");

    // the terminal went through reset, set mode and a full clear
    let records = firmware.captured_records();
    let low = |rec: &Vec<u8>| rec[0].wrapping_sub(0x40) & 0x3F;
    assert!(records.iter().any(|r| low(r) == cmd::RESET));
    assert!(records.iter().any(|r| low(r) == cmd::SET_MODE));
    assert!(records.iter().any(|r| low(r) == cmd::CLEAR));
}

#[tokio::test]
async fn keystroke_echoes_back_to_the_screen() {
    let (mut scheduler, firmware) = converter("/bin/cat");

    assert!(
        run_until(&mut scheduler, Duration::from_secs(10), |s| {
            s.station_state(0) == Some(EngineState::Ready) && s.has_session(0)
        })
        .await
    );

    // the 'e' key; the pty line discipline echoes it straight back
    firmware.press_key(0x23);

    let painted = run_until(&mut scheduler, Duration::from_secs(10), |s| {
        s.session_screen(0)
            .and_then(|screen| screen.cell(0, 0))
            .map(|cell| cell.code == 0x85)
            .unwrap_or(false)
    })
    .await;
    assert!(painted, "echoed keystroke never reached the screen model");

    // and the cell update went out as a write-data burst
    let wrote = firmware.captured_records().iter().any(|r| {
        r.len() >= 6 && (r[0].wrapping_sub(0x40) & 0x3F) == cmd::WRITE_DATA_LOAD_CURSOR && r[4] == 0x45
    });
    assert!(wrote, "no write burst carried the echoed character");
}

#[tokio::test]
async fn child_exit_detaches_the_session() {
    let (mut scheduler, _firmware) = converter("/bin/true");

    assert!(
        run_until(&mut scheduler, Duration::from_secs(10), |s| {
            s.has_session(0)
        })
        .await
    );

    let detached = run_until(&mut scheduler, Duration::from_secs(10), |s| {
        !s.has_session(0)
    })
    .await;
    assert!(detached, "session survived its child");
}
