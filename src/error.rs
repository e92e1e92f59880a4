use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// The stage a run failed in; the full tree below it says why.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not set up the artifact provider")]
    Provider,
    #[display("could not open the output directory")]
    Storage,
    #[display("signing toolchain unavailable")]
    Toolchain,
    #[display("repository assembly failed")]
    Assembly,
}
