//! Simulated bxCAN register block and collaborators for integration tests.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use bxcan_driver::{
    regs::{MailboxIdent, Raw, Register, RegisterBlock},
    CanDriver, CanFrame, CanIface, Clock, ClockControl, FrameSink, InterruptControl, IrqLine,
    MonotonicTime, Settings,
};
use embedded_hal::{
    blocking::delay::DelayMs,
    can::{ExtendedId, Frame, StandardId},
};

const MCR_INRQ: u32 = 1 << 0;
const MSR_INAK: u32 = 1 << 0;
const TSR_RQCP: u32 = 1 << 0;
const TSR_TXOK: u32 = 1 << 1;
const TSR_ABRQ: u32 = 1 << 7;
const TSR_TME0: u32 = 1 << 26;
const TIR_TXRQ: u32 = 1 << 0;
const RFR_FULL: u32 = 1 << 3;
const RFR_FOVR: u32 = 1 << 4;
const RFR_RFOM: u32 = 1 << 5;

/// How the simulated controller answers initialization requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// `INAK` follows `INRQ`.
    Normal,
    /// `INAK` never sets.
    NeverEnter,
    /// `INAK` never clears.
    NeverLeave,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TxBox {
    pub busy: bool,
    pub rqcp: bool,
    pub txok: bool,
    pub aborted: bool,
}

pub struct HwState {
    mem: [u32; 0x300 / 4],
    pub ack: AckMode,
    pub tx: [TxBox; 3],
    rx: [VecDeque<[u32; 4]>; 2],
    fovr: [bool; 2],
    lec: u32,
    /// ESR bits other than LEC: counters and error flags.
    esr_rest: u32,
    pub writes: Vec<(Register, u32)>,
}

/// One simulated controller.
pub struct Hw {
    state: Mutex<HwState>,
}

impl Hw {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(HwState {
                mem: [0; 0x300 / 4],
                ack: AckMode::Normal,
                tx: [TxBox {
                    busy: false,
                    rqcp: false,
                    txok: false,
                    aborted: false,
                }; 3],
                rx: [VecDeque::new(), VecDeque::new()],
                fovr: [false; 2],
                lec: 0,
                esr_rest: 0,
                writes: Vec::new(),
            }),
        }
    }

    /// A fresh controller living for the rest of the test binary.
    pub fn leak() -> &'static Hw {
        Box::leak(Box::new(Hw::new()))
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut HwState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_ack(&self, ack: AckMode) {
        self.with(|hw| hw.ack = ack);
    }

    /// Raw content last written to `reg`.
    pub fn stored(&self, reg: Register) -> u32 {
        self.with(|hw| hw.mem[reg.offset() / 4])
    }

    /// Every value written to `reg`, in order.
    pub fn writes_to(&self, reg: Register) -> Vec<u32> {
        self.with(|hw| {
            hw.writes
                .iter()
                .filter(|(r, _)| *r == reg)
                .map(|(_, v)| *v)
                .collect()
        })
    }

    pub fn clear_writes(&self) {
        self.with(|hw| hw.writes.clear());
    }

    pub fn tx_box(&self, mailbox: usize) -> TxBox {
        self.with(|hw| hw.tx[mailbox])
    }

    /// Finishes the transmission in `mailbox`.
    pub fn complete_tx(&self, mailbox: usize, ok: bool) {
        self.with(|hw| {
            let mb = &mut hw.tx[mailbox];
            assert!(mb.busy, "mailbox {} not transmitting", mailbox);
            mb.busy = false;
            mb.rqcp = true;
            mb.txok = ok;
        });
    }

    /// Puts `frame` into receive FIFO `fifo`, reporting an overrun past three
    /// frames like the hardware does.
    pub fn inject_rx(&self, fifo: usize, frame: &CanFrame) {
        let mut data = [0u8; 8];
        data[..frame.data().len()].copy_from_slice(frame.data());
        let words = [
            MailboxIdent::from_frame(frame).write(),
            frame.dlc() as u32,
            u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        ];
        self.inject_rx_raw(fifo, words);
    }

    /// Puts raw `RIR`, `RDTR`, `RDLR`, `RDHR` words into FIFO `fifo`.
    pub fn inject_rx_raw(&self, fifo: usize, words: [u32; 4]) {
        self.with(|hw| {
            if hw.rx[fifo].len() == 3 {
                hw.fovr[fifo] = true;
            } else {
                hw.rx[fifo].push_back(words);
            }
        });
    }

    pub fn rx_pending(&self, fifo: usize) -> usize {
        self.with(|hw| hw.rx[fifo].len())
    }

    pub fn set_lec(&self, lec: u32) {
        self.with(|hw| hw.lec = lec & 0x7);
    }

    pub fn lec(&self) -> u32 {
        self.with(|hw| hw.lec)
    }

    /// Sets the error counters and the warning/passive/bus-off flags.
    pub fn set_error_counters(&self, tec: u8, rec: u8, flags: u32) {
        self.with(|hw| hw.esr_rest = (u32::from(rec) << 24) | (u32::from(tec) << 16) | (flags & 0x7));
    }
}

impl HwState {
    fn tsr(&self) -> u32 {
        self.tx.iter().enumerate().fold(0, |tsr, (n, mb)| {
            let mut status = 0;
            if mb.rqcp {
                status |= TSR_RQCP;
            }
            if mb.txok {
                status |= TSR_TXOK;
            }
            let mut tsr = tsr | (status << (8 * n));
            if !mb.busy {
                tsr |= TSR_TME0 << n;
            }
            tsr
        })
    }

    fn rfr(&self, fifo: usize) -> u32 {
        let len = self.rx[fifo].len() as u32;
        let mut rfr = len.min(3);
        if len >= 3 {
            rfr |= RFR_FULL;
        }
        if self.fovr[fifo] {
            rfr |= RFR_FOVR;
        }
        rfr
    }

    fn rx_word(&self, fifo: usize, word: usize) -> u32 {
        self.rx[fifo].front().map_or(0, |words| words[word])
    }

    fn read(&self, reg: Register) -> u32 {
        match reg {
            Register::MSR => {
                let inak = match self.ack {
                    AckMode::Normal => self.mem[Register::MCR.offset() / 4] & MCR_INRQ != 0,
                    AckMode::NeverEnter => false,
                    AckMode::NeverLeave => true,
                };
                if inak {
                    MSR_INAK
                } else {
                    0
                }
            }
            Register::TSR => self.tsr(),
            Register::RF0R => self.rfr(0),
            Register::RF1R => self.rfr(1),
            Register::ESR => (self.lec << 4) | self.esr_rest,
            Register::RI0R => self.rx_word(0, 0),
            Register::RDT0R => self.rx_word(0, 1),
            Register::RDL0R => self.rx_word(0, 2),
            Register::RDH0R => self.rx_word(0, 3),
            Register::RI1R => self.rx_word(1, 0),
            Register::RDT1R => self.rx_word(1, 1),
            Register::RDL1R => self.rx_word(1, 2),
            Register::RDH1R => self.rx_word(1, 3),
            _ => self.mem[reg.offset() / 4],
        }
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.writes.push((reg, value));
        match reg {
            Register::TSR => {
                for (n, mb) in self.tx.iter_mut().enumerate() {
                    let bits = (value >> (8 * n)) & 0xFF;
                    if bits & TSR_RQCP != 0 {
                        mb.rqcp = false;
                        mb.txok = false;
                    }
                    if bits & TSR_ABRQ != 0 && mb.busy {
                        mb.busy = false;
                        mb.rqcp = true;
                        mb.txok = false;
                        mb.aborted = true;
                    }
                }
            }
            Register::TI0R | Register::TI1R | Register::TI2R => {
                let n = (reg.offset() - Register::TI0R.offset()) / 0x10;
                self.mem[reg.offset() / 4] = value;
                if value & TIR_TXRQ != 0 {
                    self.tx[n] = TxBox {
                        busy: true,
                        ..TxBox::default()
                    };
                }
            }
            Register::RF0R | Register::RF1R => {
                let fifo = usize::from(reg == Register::RF1R);
                if value & RFR_RFOM != 0 {
                    self.rx[fifo].pop_front();
                }
                if value & RFR_FOVR != 0 {
                    self.fovr[fifo] = false;
                }
            }
            Register::ESR => self.lec = (value >> 4) & 0x7,
            _ => self.mem[reg.offset() / 4] = value,
        }
    }
}

/// Register block handle for a [`Hw`].
#[derive(Clone, Copy)]
pub struct MockRegs(pub &'static Hw);

impl RegisterBlock for MockRegs {
    fn read(&self, reg: Register) -> u32 {
        self.0.with(|hw| hw.read(reg))
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.0.with(|hw| hw.write(reg, value))
    }
}

/// Settable clock. Idling advances monotonic time by `IDLE_STEP_US`.
pub struct TestClock {
    now: AtomicU64,
    utc: AtomicU64,
}

pub const IDLE_STEP_US: u64 = 100;

impl TestClock {
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(1_000_000),
            utc: AtomicU64::new(0),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn set_now_us(&self, us: u64) {
        self.now.store(us, Ordering::SeqCst);
    }

    pub fn advance_us(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }

    pub fn set_utc_us(&self, us: u64) {
        self.utc.store(us, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn monotonic(&self) -> MonotonicTime {
        MonotonicTime::from_ticks(self.now_us())
    }

    fn utc_usec_from_interrupt(&self) -> u64 {
        self.utc.load(Ordering::SeqCst)
    }

    fn idle(&self) {
        self.advance_us(IDLE_STEP_US);
        std::thread::yield_now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RccEvent {
    Enable(usize),
    Reset(usize),
    Disable(usize),
}

#[derive(Default)]
pub struct MockRcc {
    pub events: Vec<RccEvent>,
}

impl ClockControl for MockRcc {
    fn enable(&mut self, iface: usize) {
        self.events.push(RccEvent::Enable(iface));
    }

    fn reset(&mut self, iface: usize) {
        self.events.push(RccEvent::Reset(iface));
    }

    fn disable(&mut self, iface: usize) {
        self.events.push(RccEvent::Disable(iface));
    }
}

#[derive(Default)]
pub struct MockNvic {
    pub enabled: Vec<(IrqLine, u8)>,
}

impl InterruptControl for MockNvic {
    fn enable(&mut self, line: IrqLine, priority: u8) {
        self.enabled.push((line, priority));
    }
}

/// Delay that returns at once, adding up the requested time.
#[derive(Default)]
pub struct MockDelay {
    pub total_ms: u32,
    pub calls: u32,
}

impl DelayMs<u8> for MockDelay {
    fn delay_ms(&mut self, ms: u8) {
        self.total_ms += u32::from(ms);
        self.calls += 1;
    }
}

pub type Driver<const N: usize> = CanDriver<MockRegs, TestClock, N, 8>;

/// A driver over fresh simulated controllers, not yet initialized.
pub fn driver<const N: usize>(
    settings: Settings,
    bridge: Option<&'static dyn FrameSink>,
) -> ([&'static Hw; N], Driver<N>) {
    let hws = [(); N].map(|_| Hw::leak());
    let ifaces = core::array::from_fn(|i| CanIface::new(MockRegs(hws[i])));
    (hws, CanDriver::new(ifaces, TestClock::new(), settings, bridge))
}

/// A driver brought up at 1 Mbit/s.
pub fn started<const N: usize>(
    settings: Settings,
    bridge: Option<&'static dyn FrameSink>,
) -> ([&'static Hw; N], Driver<N>) {
    let (hws, driver) = driver(settings, bridge);
    driver
        .init(
            1_000_000,
            &mut MockRcc::default(),
            &mut MockNvic::default(),
            &mut MockDelay::default(),
        )
        .unwrap();
    (hws, driver)
}

pub fn std_frame(id: u16, data: &[u8]) -> CanFrame {
    CanFrame::new(StandardId::new(id).unwrap(), data).unwrap()
}

pub fn ext_frame(id: u32, data: &[u8]) -> CanFrame {
    CanFrame::new(ExtendedId::new(id).unwrap(), data).unwrap()
}
