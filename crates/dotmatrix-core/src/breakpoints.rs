use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// PC reached the address before the instruction was fetched.
    Execute,
    /// A CPU write targeted the address.
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub enabled: bool,
    pub range: RangeInclusive<u16>,
    pub on_execute: bool,
    pub on_write: bool,
    /// Only trip write breakpoints when this value is written.
    pub value_match: Option<u8>,
}

impl Breakpoint {
    /// Execute breakpoint on a single address.
    pub fn at(id: u32, addr: u16) -> Self {
        Self {
            id,
            enabled: true,
            range: addr..=addr,
            on_execute: true,
            on_write: false,
            value_match: None,
        }
    }

    /// Write breakpoint over an address range.
    pub fn on_write(id: u32, range: RangeInclusive<u16>) -> Self {
        Self {
            id,
            enabled: true,
            range,
            on_execute: false,
            on_write: true,
            value_match: None,
        }
    }

    pub fn matches_addr(&self, addr: u16) -> bool {
        self.range.contains(&addr)
    }

    fn matches_value(&self, value: u8) -> bool {
        self.value_match.is_none_or(|expected| expected == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointHit {
    pub id: u32,
    pub kind: BreakpointKind,
    pub addr: u16,
    pub value: Option<u8>,
    pub pc: u16,
}

#[derive(Debug, Default, Clone)]
pub struct BreakpointEngine {
    breakpoints: Vec<Breakpoint>,
    has_execute: bool,
    has_write: bool,
    suspended: bool,
    pending_hit: Option<BreakpointHit>,
    next_id: u32,
}

impl BreakpointEngine {
    pub fn set_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        self.next_id = breakpoints.iter().map(|bp| bp.id + 1).max().unwrap_or(0);
        self.breakpoints = breakpoints;
        self.recompute_fast_paths();
        self.pending_hit = None;
    }

    /// Add a breakpoint, assigning it a fresh id.
    pub fn add(&mut self, mut breakpoint: Breakpoint) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        breakpoint.id = id;
        self.breakpoints.push(breakpoint);
        self.recompute_fast_paths();
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        self.recompute_fast_paths();
        self.breakpoints.len() != before
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn set_suspended(&mut self, value: bool) {
        self.suspended = value;
        if value {
            self.pending_hit = None;
        }
    }

    pub fn has_hit(&self) -> bool {
        self.pending_hit.is_some()
    }

    pub fn take_hit(&mut self) -> Option<BreakpointHit> {
        self.pending_hit.take()
    }

    /// Record an execute hit if PC sits on an enabled execute breakpoint.
    pub fn check_execute(&mut self, pc: u16) -> bool {
        if self.suspended || !self.has_execute || self.pending_hit.is_some() {
            return false;
        }
        let hit = self
            .breakpoints
            .iter()
            .find(|bp| bp.enabled && bp.on_execute && bp.matches_addr(pc));
        if let Some(bp) = hit {
            self.pending_hit = Some(BreakpointHit {
                id: bp.id,
                kind: BreakpointKind::Execute,
                addr: pc,
                value: None,
                pc,
            });
            return true;
        }
        false
    }

    pub fn note_write(&mut self, pc: u16, addr: u16, value: u8) {
        if self.suspended || !self.has_write || self.pending_hit.is_some() {
            return;
        }
        let hit = self.breakpoints.iter().find(|bp| {
            bp.enabled && bp.on_write && bp.matches_addr(addr) && bp.matches_value(value)
        });
        if let Some(bp) = hit {
            self.pending_hit = Some(BreakpointHit {
                id: bp.id,
                kind: BreakpointKind::Write,
                addr,
                value: Some(value),
                pc,
            });
        }
    }

    fn recompute_fast_paths(&mut self) {
        self.has_execute = self.breakpoints.iter().any(|bp| bp.enabled && bp.on_execute);
        self.has_write = self.breakpoints.iter().any(|bp| bp.enabled && bp.on_write);
    }
}
