//! Operation status of the machine: one closed enum, mutated in exactly one
//! place (`StateMachine::set_status`).

/// What the machine is doing right now.
///
/// Error variants are numerically partitioned above [`Status::Error`], so
/// error-ness is a single comparison and the discriminant doubles as the
/// protocol error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Idle = 0,
    HomingRough,
    HomingFine,
    MoveToPos,
    /// Decelerating after an abort request; resolves to `ErrorCommandAborted`.
    AbortMovement,
    MoveToDraft,
    Drafting,
    MoveToClean,
    Cleaning,
    MoveToMixer,
    Mixing,
    MoveToCrusher,
    CrushingIce,
    MoveToSugar,
    DispensingSugar,
    Delay,
    SetScaleLed,
    DispenseStraw,
    PingAll,

    // Errors: everything at or above this discriminant is terminal until
    // reset_error() is called.
    Error = 32,
    ErrorIngredientEmpty,
    ErrorScaleComm,
    ErrorBus,
    ErrorStrawsEmpty,
    ErrorGlassRemoved,
    ErrorMixingFailed,
    ErrorCrusherCoverOpen,
    ErrorCrusherTimeout,
    ErrorCommandAborted,
    ErrorSugarTimeout,
}

impl Status {
    /// True for every terminal error variant.
    #[inline]
    pub fn is_error(self) -> bool {
        self as u8 >= Status::Error as u8
    }

    /// Discriminant, used verbatim as the protocol error code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}
