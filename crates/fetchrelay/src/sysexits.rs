//! Exit codes following `sysexits.h`, as mail tooling conventionally does.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Sysexit(pub i32);

pub const EX_OK: Sysexit = Sysexit(0);
/// Dry run finished but at least one account could not be verified.
pub const EX_PROBE_FAILED: Sysexit = Sysexit(1);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_SOFTWARE: Sysexit = Sysexit(70);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn code(self) -> i32 {
        self.0
    }

    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}
