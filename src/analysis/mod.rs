pub mod pulsed;

pub use pulsed::{
    analyse, analyse_mean, analyse_mean_norm, analyse_mean_reference, PulsedMethod,
    PulsedSignal, PulsedWindows,
};
