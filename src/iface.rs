//! Single controller: bring-up, transmit mailboxes, receive FIFOs.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use embedded_hal::blocking::delay::DelayMs;

use crate::{
    buffer::{data_bytes, data_words, RxFifo, TxMailbox, NUM_TX_MAILBOXES},
    error::{Error, ModeRequest, Result},
    filter::{self, FilterConfig},
    frame::{BridgeFrame, CanFrame, IoFlags},
    queue::RxQueue,
    regs::{Esr, Ier, MailboxIdent, MailboxLength, Mcr, Msr, RegisterBlock, Rfr, Tsr},
    stat::{ErrorState, LastErrorCode},
    time::{Clock, MonotonicTime, UtcTime},
    timing::compute_timings,
    Settings,
};

/// Outcome of a send that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
pub enum SendStatus {
    /// The frame was loaded into a mailbox and requested for transmission.
    Accepted,
    /// Every mailbox is busy. Retry later, or wait for write readiness.
    NoCapacity,
}

/// A frame taken from the receive queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub frame: CanFrame,
    /// Time the frame was taken from the queue.
    pub ts_monotonic: MonotonicTime,
    /// Time the frame appeared on the bus.
    pub ts_utc: UtcTime,
    /// [`IoFlags::LOOPBACK`] for copies of our own transmissions.
    pub flags: IoFlags,
}

#[derive(Debug, Clone, Copy)]
struct PendingTx {
    frame: CanFrame,
    deadline: MonotonicTime,
    loopback: bool,
}

struct State<R, const Q: usize> {
    regs: R,
    rx_queue: RxQueue<Q>,
    /// One entry per hardware mailbox, `Some` while a transmission is pending.
    pending_tx: [Option<PendingTx>; NUM_TX_MAILBOXES],
    error_cnt: u32,
    last_hw_error_code: LastErrorCode,
    had_activity: bool,
}

impl<R: RegisterBlock, const Q: usize> State<R, Q> {
    fn count_error(&mut self) {
        self.error_cnt = self.error_cnt.saturating_add(1);
    }

    fn poll_error_state(&mut self) {
        let esr: Esr = self.regs.read_reg();
        let lec = esr.lec();
        if lec != LastErrorCode::NoError {
            self.last_hw_error_code = lec;
            self.regs.write_reg(Esr::new());
            self.count_error();
        }
    }

    fn handle_tx_mailbox_completion(&mut self, mailbox: TxMailbox, txok: bool, utc_usec: u64) {
        self.had_activity |= txok;

        if let Some(tx) = self.pending_tx[mailbox.index()].take() {
            if tx.loopback && txok {
                self.rx_queue.push(tx.frame, utc_usec, IoFlags::LOOPBACK);
            }
        }
        if !txok {
            self.count_error();
        }
    }

    fn tx_buffer_full(&self) -> bool {
        let tsr: Tsr = self.regs.read_reg();
        !TxMailbox::ALL.iter().any(|mb| mb.is_empty(tsr))
    }
}

/// One bxCAN controller with its receive queue and pending transmissions.
///
/// All state shared with the interrupt handlers, the register block
/// included, sits behind a critical section.
pub struct CanIface<R, const Q: usize> {
    state: Mutex<RefCell<State<R, Q>>>,
}

impl<R: RegisterBlock, const Q: usize> CanIface<R, Q> {
    /// Wraps a controller's register block. Nothing is touched until
    /// [`CanIface::init`].
    pub const fn new(regs: R) -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                regs,
                rx_queue: RxQueue::new(),
                pending_tx: [None; NUM_TX_MAILBOXES],
                error_cnt: 0,
                last_hw_error_code: LastErrorCode::NoError,
                had_activity: false,
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State<R, Q>) -> T) -> T {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    fn state_in<'cs>(&'cs self, cs: CriticalSection<'cs>) -> core::cell::RefMut<'cs, State<R, Q>> {
        self.state.borrow_ref_mut(cs)
    }

    /// Runs `f` on the register block inside a critical section.
    pub fn with_registers<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        self.with_state(|state| f(&mut state.regs))
    }

    /// Brings the controller up at `bit_rate`.
    ///
    /// `index` is the controller's position in the driver; index 0 also
    /// programs the shared acceptance filters for `iface_count` controllers.
    /// Nothing is rolled back on failure.
    pub fn init<D: DelayMs<u8>>(
        &self,
        index: usize,
        iface_count: usize,
        bit_rate: u32,
        settings: &Settings,
        delay: &mut D,
    ) -> Result<()> {
        let timings = compute_timings(settings.pclk_hz, bit_rate)?;
        debug!(
            "Timings: presc={} sjw={} bs1={} bs2={}",
            timings.prescaler,
            timings.sjw,
            timings.bs1,
            timings.bs2
        );

        self.with_registers(|regs| {
            regs.modify_reg::<Mcr>(|mcr| mcr.with_sleep(false).with_inrq(true));
        });
        if !self.wait_init_ack(true, settings, delay) {
            warn!("MSR INAK not set");
            return Err(Error::ModeTimeout(ModeRequest::Enter));
        }

        self.with_registers(|regs| {
            regs.write_reg(
                Mcr::new()
                    .with_abom(true)
                    .with_awum(true)
                    .with_inrq(true)
                    .with_txfp(true),
            );
            regs.write_reg(
                timings
                    .btr()
                    .with_lbkm(settings.mode.loopback())
                    .with_silm(settings.mode.silent()),
            );
            regs.write_reg(
                Ier::new()
                    .with_tmeie(true)
                    .with_fmpie0(true)
                    .with_fmpie1(true),
            );
            regs.modify_reg::<Mcr>(|mcr| mcr.with_inrq(false));
        });
        if !self.wait_init_ack(false, settings, delay) {
            warn!("MSR INAK not cleared");
            return Err(Error::ModeTimeout(ModeRequest::Leave));
        }

        if index == 0 {
            self.with_registers(|regs| filter::accept_all(regs, iface_count));
        }

        Ok(())
    }

    /// Polls `MSR.INAK` until it equals `target`, within the configured
    /// attempt budget.
    fn wait_init_ack<D: DelayMs<u8>>(&self, target: bool, settings: &Settings, delay: &mut D) -> bool {
        for _ in 0..settings.ack_attempts {
            let msr: Msr = self.with_registers(|regs| regs.read_reg());
            if msr.inak() == target {
                return true;
            }
            delay.delay_ms(settings.ack_poll_ms);
        }
        false
    }

    /// Loads `frame` into the first empty mailbox and requests transmission.
    ///
    /// Error frames and frames with a data length code above 8 are rejected
    /// without touching the hardware. A transmission still pending at
    /// `deadline` is aborted by [`CanIface::discard_timed_out_transmissions`].
    pub fn send(&self, frame: &CanFrame, deadline: MonotonicTime, flags: IoFlags) -> Result<SendStatus> {
        if !frame.is_transmittable() {
            return Err(Error::InvalidFrame);
        }

        self.with_state(|state| {
            let tsr: Tsr = state.regs.read_reg();
            let mailbox = match TxMailbox::ALL.into_iter().find(|mb| mb.is_empty(tsr)) {
                Some(mailbox) => mailbox,
                None => return Ok(SendStatus::NoCapacity),
            };

            let [ir, dtr, dlr, dhr] = mailbox.registers();
            let ident = MailboxIdent::from_frame(frame);
            let (low, high) = data_words(&frame.data);
            state.regs.write_as(ir, ident);
            state.regs.write_as(dtr, MailboxLength::new().with_dlc(frame.dlc));
            state.regs.write(dlr, low);
            state.regs.write(dhr, high);
            state.regs.write_as(ir, ident.with_txrq(true));

            state.pending_tx[mailbox.index()] = Some(PendingTx {
                frame: *frame,
                deadline,
                loopback: flags.contains(IoFlags::LOOPBACK),
            });
            Ok(SendStatus::Accepted)
        })
    }

    /// Takes the oldest received frame, if any.
    pub fn receive<C: Clock>(&self, clock: &C) -> Option<Received> {
        let ts_monotonic = clock.monotonic();
        let item = self.with_state(|state| {
            if state.rx_queue.is_empty() {
                None
            } else {
                state.rx_queue.pop()
            }
        })?;
        Some(Received {
            frame: item.frame,
            ts_monotonic,
            ts_utc: UtcTime::from_usec(item.utc_usec),
            flags: item.flags,
        })
    }

    /// Always fails: hardware acceptance filters are not configurable.
    pub fn configure_filters(&self, filters: &[FilterConfig]) -> Result<()> {
        filter::configure(filters)
    }

    /// Aborts every pending transmission whose deadline is before
    /// `current_time`, counting each as an error.
    pub fn discard_timed_out_transmissions(&self, current_time: MonotonicTime) {
        self.with_state(|state| {
            for mailbox in TxMailbox::ALL {
                let expired = matches!(
                    state.pending_tx[mailbox.index()],
                    Some(tx) if tx.deadline < current_time
                );
                if expired {
                    state.regs.write_reg(mailbox.abort_request());
                    state.pending_tx[mailbox.index()] = None;
                    state.count_error();
                }
            }
        });
    }

    /// Latches and clears the hardware last error code, if any.
    pub fn poll_error_state(&self) {
        self.with_state(|state| state.poll_error_state());
    }

    /// Services the transmit interrupt. Interrupt context only.
    ///
    /// Returns whether mailbox 0 completed.
    pub fn handle_tx_interrupt(&self, utc_usec: u64) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state_in(cs);
            let mut mb0_done = false;
            for mailbox in TxMailbox::ALL {
                let tsr: Tsr = state.regs.read_reg();
                let status = mailbox.status(tsr);
                if status.rqcp() {
                    // TXOK clear with RQCP set means the hardware gave up.
                    let txok = status.txok();
                    state.regs.write_reg(mailbox.clear_completion());
                    state.handle_tx_mailbox_completion(mailbox, txok, utc_usec);
                    mb0_done |= mailbox == TxMailbox::M0;
                }
            }
            state.poll_error_state();
            mb0_done
        })
    }

    /// Services a receive FIFO interrupt. Interrupt context only.
    ///
    /// Returns the raw frame for the bridge, or `None` if the FIFO was empty.
    pub fn handle_rx_interrupt(&self, fifo: RxFifo, utc_usec: u64) -> Option<BridgeFrame> {
        critical_section::with(|cs| {
            let mut state = self.state_in(cs);

            let rfr: Rfr = state.regs.read_as(fifo.rfr());
            if rfr.fmp() == 0 {
                debug_assert!(false, "RX interrupt with empty FIFO");
                return None;
            }
            if rfr.fovr() {
                state.count_error();
            }

            let [ir, dtr, dlr, dhr] = fifo.registers();
            let ident: MailboxIdent = state.regs.read_as(ir);
            let length: MailboxLength = state.regs.read_as(dtr);
            let data = data_bytes(state.regs.read(dlr), state.regs.read(dhr));
            state.regs.write_as(fifo.rfr(), Rfr::RELEASE);

            let frame = CanFrame::from_parts(ident.id(), ident.rtr(), length.dlc().min(8), data);
            let raw = BridgeFrame {
                id: BridgeFrame::flagged_id(&frame),
                dlc: length.dlc(),
                data,
            };

            state.rx_queue.push(frame, utc_usec, IoFlags::empty());
            state.had_activity = true;
            state.poll_error_state();
            Some(raw)
        })
    }

    /// Whether every transmit mailbox is busy.
    pub fn is_tx_buffer_full(&self) -> bool {
        self.with_state(|state| state.tx_buffer_full())
    }

    /// Whether transmit mailbox 0 is empty.
    pub fn is_tx_mailbox0_empty(&self) -> bool {
        self.with_registers(|regs| TxMailbox::M0.is_empty(regs.read_reg()))
    }

    pub fn is_rx_buffer_empty(&self) -> bool {
        self.with_state(|state| state.rx_queue.is_empty())
    }

    pub fn rx_queue_length(&self) -> usize {
        self.with_state(|state| state.rx_queue.len())
    }

    /// Driver-side errors plus receive queue overflows, saturating.
    pub fn error_count(&self) -> u32 {
        self.with_state(|state| state.error_cnt.saturating_add(state.rx_queue.overflow_count()))
    }

    /// Last hardware error code seen since the previous call.
    pub fn last_hardware_error_code(&self) -> Option<LastErrorCode> {
        self.with_state(|state| {
            let code = core::mem::replace(&mut state.last_hw_error_code, LastErrorCode::NoError);
            (code != LastErrorCode::NoError).then_some(code)
        })
    }

    /// Whether a frame was received or sent since the previous call.
    pub fn had_activity(&self) -> bool {
        self.with_state(|state| core::mem::take(&mut state.had_activity))
    }

    /// Current fault confinement state of the controller.
    pub fn error_state(&self) -> ErrorState {
        self.with_registers(|regs| ErrorState::from(regs.read_reg::<Esr>()))
    }
}
