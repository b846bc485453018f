#[macro_export]
#[doc(hidden)]
macro_rules! dummy {
    ($t:expr) => {
        ()
    };
}

/// Defines an enum of hardware slots, each backed by an `IR`, `DTR`, `DLR`,
/// `DHR` register quadruple.
#[macro_export]
#[doc(hidden)]
macro_rules! mailbox_def {
    (
        $(#[doc = $doc:expr])*
        $name:ident => {
            $(
                $(#[doc = $slot_doc:expr])*
                $slot:ident => $regs:expr
            ),*
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[cfg_attr(feature = "ufmt", derive(ufmt::derive::uDebug))]
        pub enum $name {
            $(
                $(#[doc = $slot_doc])*
                $slot,
            )*
        }

        impl $name {
            #[doc = concat!("All valid options for [`", stringify!($name), "`].")]
            pub const ALL: [Self; <[_]>::len(&[$($crate::dummy!($slot)),*])] = [$(Self::$slot),*];

            #[doc = concat!("Returns the identifier, length, low data and high data registers (in that order) of the [`", stringify!($name), "`].")]
            pub const fn registers(self) -> [$crate::regs::Register; 4] {
                match self {
                    $(Self::$slot => $regs,)*
                }
            }

            /// Index of the slot in hardware order.
            #[inline]
            pub const fn index(self) -> usize {
                self as usize
            }
        }
    };
}

/// Generates interrupt handlers forwarding to a driver `static`.
///
/// Each entry is `HANDLER = kind(iface)` where `kind` is one of the functions
/// in [`irq`](crate::irq). Attributes such as `#[interrupt]` are passed
/// through to the generated function.
///
/// ```ignore
/// bxcan_driver::bind_can_interrupts!(CAN => {
///     #[interrupt]
///     CAN1_TX = tx(0),
///     #[interrupt]
///     CAN1_RX0 = rx0(0),
///     #[interrupt]
///     CAN1_RX1 = rx1(0)
/// });
/// ```
#[macro_export]
macro_rules! bind_can_interrupts {
    ($driver:expr => {
        $(
            $(#[$attr:meta])*
            $handler:ident = $kind:ident($iface:expr)
        ),* $(,)?
    }) => {
        $(
            $(#[$attr])*
            #[allow(non_snake_case)]
            fn $handler() {
                $crate::irq::$kind(&$driver, $iface);
            }
        )*
    };
}
