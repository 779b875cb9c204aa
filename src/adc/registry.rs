//! Handle arena and daisy chains
//!
//! Instances sharing a common block can be linked so that configuration affecting the
//! whole block (the clock prescaler) checks every member, and so that ADC1 and ADC2
//! can be driven as a multimode pair. The chain of a common block is an ordered member
//! list; the successor of the last member is the first one.

use heapless::Vec;

use super::{
    Adc, CallbackKind, CommonBlock, CommonState, Config, Error, GroupState, Instance, Result,
    State, StopMode, REGULAR,
};
use crate::dma::{DmaChannel, DmaEvent, NoDma};
use crate::pacext::adc::RegisterAccess;
use crate::timer::Timebase;

/// Slot of a handle in an [`Adcs`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandleId(u8);

impl HandleId {
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Outcome of removing a handle from its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Unlink {
    /// The handle was in no chain
    NotLinked,
    /// The predecessor now precedes the old successor
    Spliced,
    /// The chain is gone; its last member is unlinked as well
    Dissolved(HandleId),
}

/// Chains of linked handles, one per common block, in link order
#[derive(Debug)]
pub struct LinkRegistry<const N: usize> {
    chains: [Vec<HandleId, N>; CommonBlock::COUNT],
}

impl<const N: usize> LinkRegistry<N> {
    pub const fn new() -> Self {
        Self {
            chains: [Vec::new(), Vec::new()],
        }
    }

    /// Members of the chain of `block`, empty if nothing is linked there
    pub fn chain(&self, block: CommonBlock) -> &[HandleId] {
        &self.chains[block.index()]
    }

    /// Common block of the chain holding `id`
    pub fn block_of(&self, id: HandleId) -> Option<CommonBlock> {
        [CommonBlock::Adc12, CommonBlock::Adc4]
            .into_iter()
            .find(|b| self.chains[b.index()].contains(&id))
    }

    pub fn is_linked(&self, id: HandleId) -> bool {
        self.block_of(id).is_some()
    }

    /// Next member after `id`, wrapping around
    pub fn successor(&self, id: HandleId) -> Option<HandleId> {
        let chain = &self.chains[self.block_of(id)?.index()];
        let pos = chain.iter().position(|m| *m == id)?;
        chain.get((pos + 1) % chain.len()).copied()
    }

    /// Chain members starting from `id`, or just `id` when it is unlinked
    pub fn members_from(&self, id: HandleId) -> Vec<HandleId, N> {
        let mut members = Vec::new();
        let mut cur = id;
        loop {
            if members.push(cur).is_err() {
                break;
            }
            match self.successor(cur) {
                Some(next) if next != id => cur = next,
                _ => break,
            }
        }
        members
    }

    /// Inserts `b` right after `a` in the chain of `block`, creating the chain if needed
    ///
    /// Nothing changes when an error is returned.
    pub fn link(&mut self, block: CommonBlock, a: HandleId, b: HandleId) -> Result<()> {
        if a == b {
            return Err(Error::InvalidParam);
        }
        if self.is_linked(b) {
            return Err(Error::Busy);
        }
        match self.block_of(a) {
            Some(other) if other != block => return Err(Error::InvalidParam),
            _ => {}
        }

        let chain = &mut self.chains[block.index()];
        if chain.is_empty() {
            if N < 2 {
                return Err(Error::InvalidParam);
            }
            let _ = chain.push(a);
            let _ = chain.push(b);
            return Ok(());
        }

        let pos = chain
            .iter()
            .position(|m| *m == a)
            .ok_or(Error::InvalidParam)?;
        chain.insert(pos + 1, b).map_err(|_| Error::InvalidParam)
    }

    /// Removes `id` from its chain
    pub fn unlink(&mut self, id: HandleId) -> Unlink {
        let block = match self.block_of(id) {
            Some(block) => block,
            None => return Unlink::NotLinked,
        };
        let chain = &mut self.chains[block.index()];
        if let Some(pos) = chain.iter().position(|m| *m == id) {
            chain.remove(pos);
        }
        if chain.len() == 1 {
            if let Some(last) = chain.pop() {
                return Unlink::Dissolved(last);
            }
        }
        Unlink::Spliced
    }
}

impl<const N: usize> Default for LinkRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena of converter handles and of their links
///
/// Handles are addressed by [`HandleId`]. Operations spanning several handles, linking
/// and multimode, go through the arena.
pub struct Adcs<R, D = NoDma, const N: usize = 3> {
    slots: [Option<Adc<R, D>>; N],
    pub(crate) links: LinkRegistry<N>,
}

impl<R: RegisterAccess, D: DmaChannel, const N: usize> Adcs<R, D, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            links: LinkRegistry::new(),
        }
    }

    /// Initializes a handle of `instance` over `regs`
    ///
    /// Fails with `Busy` if a handle of the instance is already initialized. A handle
    /// left in `Reset` by [`Adcs::deinit`] is replaced.
    pub fn init(&mut self, regs: R, instance: Instance) -> Result<HandleId> {
        let slot = self.free_slot(instance)?;
        self.slots[slot] = Some(Adc::new(regs, instance));
        Ok(HandleId(slot as u8))
    }

    /// Takes over a handle initialized and configured on its own
    pub fn insert(&mut self, adc: Adc<R, D>) -> Result<HandleId> {
        debug_assert_eq!(adc.common_state(), CommonState::Independent);
        let slot = self.free_slot(adc.instance())?;
        self.slots[slot] = Some(adc);
        Ok(HandleId(slot as u8))
    }

    fn free_slot(&self, instance: Instance) -> Result<usize> {
        let existing = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(adc) if adc.instance() == instance));
        match existing {
            Some(i) if self.slots[i].as_ref().map(|a| a.state()) == Some(State::Reset) => Ok(i),
            Some(_) => Err(Error::Busy),
            None => self
                .slots
                .iter()
                .position(|s| s.is_none())
                .ok_or(Error::InvalidParam),
        }
    }

    /// Removes a handle from the arena, unlinking it first
    pub fn take(&mut self, id: HandleId) -> Option<Adc<R, D>> {
        let mut adc = self.slots.get_mut(id.index())?.take()?;
        self.unlink(id);
        adc.common_state = CommonState::Independent;
        Some(adc)
    }

    pub fn get(&self, id: HandleId) -> Option<&Adc<R, D>> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: HandleId) -> Option<&mut Adc<R, D>> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    pub(crate) fn handle(&self, id: HandleId) -> Result<&Adc<R, D>> {
        self.get(id).ok_or(Error::InvalidParam)
    }

    pub(crate) fn handle_mut(&mut self, id: HandleId) -> Result<&mut Adc<R, D>> {
        self.get_mut(id).ok_or(Error::InvalidParam)
    }

    /// Two distinct handles borrowed at once
    pub(crate) fn pair_mut(
        &mut self,
        a: HandleId,
        b: HandleId,
    ) -> Result<(&mut Adc<R, D>, &mut Adc<R, D>)> {
        let (i, j) = (a.index(), b.index());
        if i == j || i.max(j) >= N {
            return Err(Error::InvalidParam);
        }
        let (lo, hi) = self.slots.split_at_mut(i.max(j));
        let first = lo[i.min(j)].as_mut().ok_or(Error::InvalidParam)?;
        let second = hi[0].as_mut().ok_or(Error::InvalidParam)?;
        Ok(if i < j { (first, second) } else { (second, first) })
    }

    /// Chain registry
    pub fn links(&self) -> &LinkRegistry<N> {
        &self.links
    }

    /// Links `b` right after `a` in the chain of their common block
    ///
    /// Both handles must be initialized, belong to distinct instances of one common
    /// block, and `b` must not be linked yet. Every check runs before any change.
    pub fn link(&mut self, a: HandleId, b: HandleId) -> Result<()> {
        let ha = self.handle(a)?;
        let hb = self.handle(b)?;
        if ha.instance() == hb.instance() || ha.instance().common() != hb.instance().common() {
            return Err(Error::InvalidParam);
        }
        if ha.state() == State::Reset
            || hb.state() == State::Reset
            || ha.common_state() == CommonState::Multimode
        {
            return Err(Error::Busy);
        }
        let block = ha.instance().common();

        self.links.link(block, a, b)?;
        for id in [a, b] {
            if let Some(adc) = self.get_mut(id) {
                adc.common_state = CommonState::Linked;
            }
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("linked {} after {}", b, a);
        Ok(())
    }

    fn unlink(&mut self, id: HandleId) {
        if let Unlink::Dissolved(last) = self.links.unlink(id) {
            if let Some(adc) = self.get_mut(last) {
                adc.common_state = CommonState::Independent;
            }
        }
    }

    /// Resets a handle and removes it from its chain
    ///
    /// When a single member remains, it returns to `Independent`.
    pub fn deinit(&mut self, id: HandleId, tb: &mut impl Timebase) -> Result<()> {
        self.handle_mut(id)?.deinit(tb);
        self.unlink(id);
        Ok(())
    }

    /// Configures a handle, see [`Adc::set_config`]
    ///
    /// The clock prescaler of a linked handle only changes while every member of the
    /// chain is `Reset`, `Init`, `Configuring` or `Idle`.
    pub fn set_config(&mut self, id: HandleId, config: &Config) -> Result<()> {
        let clock_free = self.links.members_from(id).iter().all(|m| {
            self.get(*m).map_or(true, |adc| {
                matches!(
                    adc.state(),
                    State::Reset | State::Init | State::Configuring | State::Idle
                )
            })
        });
        self.handle_mut(id)?.apply_config(config, clock_free)
    }

    /// Handles an event of the regular group DMA channel of `id`
    ///
    /// Completes a multimode stop on every chain member, see
    /// [`Adc::on_dma_event`] otherwise.
    pub fn on_dma_event(&mut self, id: HandleId, event: DmaEvent) {
        let mm_stop = matches!(
            self.get(id).map(|adc| adc.stop_mode),
            Some(StopMode::Multimode)
        );
        if event == DmaEvent::AbortComplete && mm_stop {
            self.complete_mm_dma_stop(id);
        } else if let Some(adc) = self.get_mut(id) {
            adc.on_dma_event(event);
        }
    }

    /// Ends a stopped multimode transfer: every member back to `Active` with its
    /// regular group `Idle`, then the stop callback of `id`
    pub(crate) fn complete_mm_dma_stop(&mut self, id: HandleId) {
        for m in self.links.members_from(id) {
            if let Some(adc) = self.get_mut(m) {
                adc.common_state = CommonState::Multimode;
                adc.state = State::Active;
                adc.group_state[REGULAR] = GroupState::Idle;
                adc.stop_mode = StopMode::Single;
            }
        }
        if let Some(adc) = self.get_mut(id) {
            adc.call(CallbackKind::RegXferStop);
        }
    }
}

impl<R: RegisterAccess, D: DmaChannel, const N: usize> Default for Adcs<R, D, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::sim::{idle_handle, SimAdc, SimAdcs, SimClock, SimCommon};
    use crate::adc::{ClockPrescaler, ConvGroup, Resolution};
    use crate::pacext::adc::{ccr, cfgr1, Mmio, Reg};

    const H0: HandleId = HandleId::new(0);
    const H1: HandleId = HandleId::new(1);
    const H2: HandleId = HandleId::new(2);

    #[test]
    fn chains_of_one_two_and_three_members() {
        let mut links = LinkRegistry::<4>::new();
        let block = CommonBlock::Adc12;

        // Single handle: no chain at all
        assert_eq!(links.members_from(H0).as_slice(), [H0]);
        assert_eq!(links.unlink(H0), Unlink::NotLinked);

        links.link(block, H0, H1).unwrap();
        assert_eq!(links.chain(block), [H0, H1]);
        assert_eq!(links.successor(H1), Some(H0));

        links.link(block, H0, H2).unwrap();
        assert_eq!(links.chain(block), [H0, H2, H1]);
        assert_eq!(links.members_from(H2).as_slice(), [H2, H1, H0]);

        // Middle member leaves: predecessor now precedes the old successor
        assert_eq!(links.unlink(H2), Unlink::Spliced);
        assert_eq!(links.successor(H0), Some(H1));
        assert_eq!(links.successor(H1), Some(H0));

        assert_eq!(links.unlink(H0), Unlink::Dissolved(H1));
        assert!(links.chain(block).is_empty());
        assert!(!links.is_linked(H1));
    }

    #[test]
    fn head_of_three_member_chain_leaves() {
        let mut links = LinkRegistry::<3>::new();
        let block = CommonBlock::Adc12;
        links.link(block, H0, H1).unwrap();
        links.link(block, H1, H2).unwrap();
        assert_eq!(links.chain(block), [H0, H1, H2]);

        assert_eq!(links.unlink(H0), Unlink::Spliced);
        assert_eq!(links.successor(H2), Some(H1));
        assert_eq!(links.block_of(H1), Some(block));
    }

    #[test]
    fn refused_links_change_nothing() {
        let mut links = LinkRegistry::<2>::new();
        assert_eq!(
            links.link(CommonBlock::Adc12, H0, H0),
            Err(Error::InvalidParam)
        );
        links.link(CommonBlock::Adc12, H0, H1).unwrap();

        assert_eq!(links.link(CommonBlock::Adc12, H0, H1), Err(Error::Busy));
        assert_eq!(
            links.link(CommonBlock::Adc4, H0, H2),
            Err(Error::InvalidParam)
        );
        // Full chain
        assert_eq!(
            links.link(CommonBlock::Adc12, H1, H2),
            Err(Error::InvalidParam)
        );
        // Unrelated handle cannot open a second chain on the block
        let mut links3 = LinkRegistry::<3>::new();
        links3.link(CommonBlock::Adc12, H0, H1).unwrap();
        assert_eq!(
            links3.link(CommonBlock::Adc12, H2, HandleId::new(3)),
            Err(Error::InvalidParam)
        );

        assert_eq!(links.chain(CommonBlock::Adc12), [H0, H1]);
        assert!(links.chain(CommonBlock::Adc4).is_empty());
    }

    #[test]
    fn init_refuses_duplicate_instances() {
        let common = SimCommon::default();
        let hw = SimAdc::new(&common, Mmio::ADC1 as u32);
        let hw_again = SimAdc::new(&common, Mmio::ADC1 as u32);
        let mut adcs: SimAdcs = Adcs::new();

        let id = adcs.init(&hw, Instance::Adc1).unwrap();
        assert_eq!(adcs.get(id).map(|a| a.state()), Some(State::Init));
        assert_eq!(adcs.init(&hw_again, Instance::Adc1), Err(Error::Busy));
    }

    #[test]
    fn cross_block_link_rejected_before_any_change() {
        let common12 = SimCommon::default();
        let common4 = SimCommon::default();
        let hw1 = SimAdc::new(&common12, Mmio::ADC1 as u32);
        let hw4 = SimAdc::new(&common4, Mmio::ADC4 as u32);
        let mut adcs: SimAdcs = Adcs::new();
        let a = adcs.insert(idle_handle(&hw1, Instance::Adc1)).unwrap();
        let b = adcs.insert(idle_handle(&hw4, Instance::Adc4)).unwrap();
        hw1.clear_log();
        hw4.clear_log();

        assert_eq!(adcs.link(a, b), Err(Error::InvalidParam));
        for id in [a, b] {
            assert_eq!(
                adcs.get(id).map(|h| h.common_state()),
                Some(CommonState::Independent)
            );
            assert!(!adcs.links().is_linked(id));
        }
        assert_eq!(hw1.writes() + hw4.writes(), 0);
    }

    #[test]
    fn reset_of_linked_handles_repairs_chain() {
        let common = SimCommon::default();
        let hw1 = SimAdc::new(&common, Mmio::ADC1 as u32);
        let hw2 = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut tb = SimClock::new();
        let mut adcs: SimAdcs = Adcs::new();
        let a = adcs.insert(idle_handle(&hw1, Instance::Adc1)).unwrap();
        let b = adcs.insert(idle_handle(&hw2, Instance::Adc2)).unwrap();

        adcs.link(a, b).unwrap();
        assert_eq!(adcs.link(a, b), Err(Error::Busy));
        assert_eq!(adcs.get(a).unwrap().common_state(), CommonState::Linked);

        adcs.get_mut(b).unwrap().start(&mut tb).unwrap();
        adcs.deinit(b, &mut tb).unwrap();

        let hb = adcs.get(b).unwrap();
        assert_eq!(hb.state(), State::Reset);
        assert_eq!(hb.group_state(ConvGroup::Regular), GroupState::Reset);
        assert_eq!(hb.common_state(), CommonState::Independent);
        assert_eq!(adcs.get(a).unwrap().common_state(), CommonState::Independent);
        assert!(adcs.links().chain(CommonBlock::Adc12).is_empty());

        // A reset handle cannot be linked, but its slot can be initialized again
        assert_eq!(adcs.link(a, b), Err(Error::Busy));
        assert_eq!(adcs.init(&hw2, Instance::Adc2), Ok(b));
    }

    #[test]
    fn take_unlinks() {
        let common = SimCommon::default();
        let hw1 = SimAdc::new(&common, Mmio::ADC1 as u32);
        let hw2 = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut adcs: SimAdcs = Adcs::new();
        let a = adcs.insert(idle_handle(&hw1, Instance::Adc1)).unwrap();
        let b = adcs.insert(idle_handle(&hw2, Instance::Adc2)).unwrap();
        adcs.link(a, b).unwrap();

        let taken = adcs.take(a).unwrap();
        assert_eq!(taken.common_state(), CommonState::Independent);
        assert!(adcs.get(a).is_none());
        assert_eq!(adcs.get(b).unwrap().common_state(), CommonState::Independent);
    }

    #[test]
    fn clock_locked_while_a_member_runs() {
        let common = SimCommon::default();
        let hw1 = SimAdc::new(&common, Mmio::ADC1 as u32);
        let hw2 = SimAdc::new(&common, Mmio::ADC2 as u32);
        let mut tb = SimClock::new();
        let mut adcs: SimAdcs = Adcs::new();
        let a = adcs.insert(idle_handle(&hw1, Instance::Adc1)).unwrap();
        let b = adcs.insert(idle_handle(&hw2, Instance::Adc2)).unwrap();
        adcs.link(a, b).unwrap();
        let presc = hw1.peek(Reg::Ccr) & ccr::PRESC.mask();

        adcs.get_mut(b).unwrap().start(&mut tb).unwrap();
        let cfg = Config {
            clock: ClockPrescaler::Div16,
            resolution: Resolution::Bits10,
            ..Config::default()
        };
        assert_eq!(adcs.set_config(a, &cfg), Err(Error::ClockLocked));
        assert_eq!(hw1.peek(Reg::Ccr) & ccr::PRESC.mask(), presc);
        // Other fields still applied
        assert_eq!(hw1.peek(Reg::Cfgr1) & cfgr1::RES.mask(), cfgr1::RES.bits(2));

        adcs.get_mut(b).unwrap().stop(&mut tb).unwrap();
        adcs.set_config(a, &cfg).unwrap();
        assert_eq!(adcs.get(a).unwrap().config().clock, ClockPrescaler::Div16);
    }
}
