//! Pending tags and tag authentication.
//!
//! Tags extracted from MACK messages wait here until the TESLA key that
//! verifies them is disclosed and proven authentic. Each tag reaches exactly
//! one terminal outcome: verified OK, invalid, abandoned because its key
//! never arrived, or unresolvable because the navigation data it refers to
//! was never seen.

use crate::bitfields::{Adkd, Mack, NmaStatus};
use crate::events::{AuthOutcome, Event};
use crate::maclt::{self, MacLtError};
use crate::navdata::NavDataStore;
use crate::tesla::Key;
use crate::types::BitVec;
use crate::validation::Validated;
use crate::{Gst, Svn};
use bitvec::prelude::*;
use std::collections::BTreeMap;

/// A tag waiting for its TESLA key.
#[derive(Debug, Clone, Eq, PartialEq)]
struct TagRecord {
    prnd: u8,
    adkd: Adkd,
    // 1-based position within the MACK message
    ctr: u8,
    cop: u8,
    is_tag0: bool,
    tag: BitVec,
    resolved: bool,
}

/// The tags and MACK metadata collected from one sub-frame of one satellite.
#[derive(Debug, Clone, Eq, PartialEq)]
struct SubframeTags {
    nma_status: NmaStatus,
    macseq: u16,
    flx_info: Vec<u16>,
    macseq_checked: bool,
    tags: Vec<TagRecord>,
}

impl SubframeTags {
    fn all_resolved(&self) -> bool {
        self.tags.iter().all(|t| t.resolved)
    }
}

/// Queue of pending tags, grouped by authoring sub-frame epoch and SVN.
#[derive(Debug, Clone, Default)]
pub struct PendingTags {
    groups: BTreeMap<(Gst, u8), SubframeTags>,
}

impl PendingTags {
    /// Creates an empty queue.
    pub fn new() -> PendingTags {
        PendingTags::default()
    }

    /// Extracts and enqueues the tags of a MACK message.
    ///
    /// The tag sequence is first checked against the MAC look-up table entry
    /// for `maclt`; on a sequence violation nothing is enqueued and the
    /// error is returned. Tags with reserved PRND or ADKD values are skipped.
    pub fn collect(
        &mut self,
        mack: &Mack<'_>,
        prna: Svn,
        gst: Gst,
        nma_status: NmaStatus,
        maclt: u8,
    ) -> Result<(), MacLtError> {
        let msg = usize::try_from((gst.tow() / 30) % 2).unwrap();
        maclt::check_tag_sequence(maclt, msg, mack, prna)?;

        let flx_info = maclt::flx_indices(maclt, msg)?
            .map(|i| mack.tag_and_info(i).info().load_be::<u16>())
            .collect();

        let mut tags = Vec::with_capacity(mack.num_tags());
        tags.push(TagRecord {
            prnd: u8::from(prna),
            adkd: Adkd::InavCed,
            ctr: 1,
            cop: mack.cop(),
            is_tag0: true,
            tag: BitVec::from_bitslice(mack.tag0()),
            resolved: false,
        });
        for j in 1..mack.num_tags() {
            let tag = mack.tag_and_info(j);
            let prnd = match u8::try_from(tag.prnd()) {
                Ok(p) => p,
                Err(()) => {
                    log::error!("reserved PRND in tag {tag:?}. skipping");
                    continue;
                }
            };
            let adkd = tag.adkd();
            if adkd == Adkd::Reserved {
                log::error!("reserved ADKD in tag {tag:?}. skipping");
                continue;
            }
            tags.push(TagRecord {
                prnd,
                adkd,
                ctr: u8::try_from(j + 1).unwrap(),
                cop: tag.cop(),
                is_tag0: false,
                tag: BitVec::from_bitslice(tag.tag()),
                resolved: false,
            });
        }
        self.groups.insert(
            (gst, u8::from(prna)),
            SubframeTags {
                nma_status,
                macseq: mack.macseq(),
                flx_info,
                macseq_checked: false,
                tags,
            },
        );
        Ok(())
    }

    /// Gives the authoring epoch of the oldest pending group.
    pub fn earliest(&self) -> Option<Gst> {
        self.groups.keys().next().map(|(gst, _)| *gst)
    }

    /// Resolves the tags made verifiable by a newly authentic key.
    ///
    /// A key of sub-frame `k` verifies the ADKD=0/4 tags authored at
    /// `k - 30` and the slow MAC tags authored at `k - 330`. Tags resolve in
    /// ascending CTR within a sub-frame and in ascending SVN across the
    /// satellites of one epoch. The MACSEQ of each MACK is checked with the
    /// same key during the fast pass; a mismatch is reported but the tags
    /// still resolve on their own MAC checks.
    pub fn resolve_with_key(
        &mut self,
        key: &Key<Validated>,
        navdata: &NavDataStore,
        emit: &mut dyn FnMut(Event),
    ) {
        let key_gst = key.gst_subframe();
        self.resolve_epoch(key_gst.add_seconds(-30), false, key, navdata, emit);
        self.resolve_epoch(key_gst.add_seconds(-330), true, key, navdata, emit);
    }

    fn resolve_epoch(
        &mut self,
        gst: Gst,
        slow: bool,
        key: &Key<Validated>,
        navdata: &NavDataStore,
        emit: &mut dyn FnMut(Event),
    ) {
        let mut done = Vec::new();
        for (&(_, prna_id), group) in self.groups.range_mut((gst, 0)..=(gst, u8::MAX)) {
            let prna = Svn::try_from(prna_id).expect("groups are keyed by valid SVN");
            if !slow && !group.macseq_checked {
                group.macseq_checked = true;
                if !key.validate_macseq(group.macseq, &group.flx_info, prna, gst) {
                    emit(Event::MacseqFail {
                        wn: gst.wn(),
                        tow: gst.tow(),
                        svid: prna_id,
                    });
                }
            }
            for record in &mut group.tags {
                if record.resolved || (record.adkd == Adkd::SlowMac) != slow {
                    continue;
                }
                let outcome = Self::resolve_tag(record, prna, gst, group.nma_status, key, navdata);
                record.resolved = true;
                emit(Event::AuthAttempt {
                    prnd: record.prnd,
                    prna: prna_id,
                    wn: gst.wn(),
                    tow: gst.tow(),
                    adkd: record.adkd.value(),
                    outcome,
                });
            }
            if group.all_resolved() {
                done.push((gst, prna_id));
            }
        }
        for group_key in done {
            self.groups.remove(&group_key);
        }
    }

    fn resolve_tag(
        record: &TagRecord,
        prna: Svn,
        gst: Gst,
        nma_status: NmaStatus,
        key: &Key<Validated>,
        navdata: &NavDataStore,
    ) -> AuthOutcome {
        // Tags authenticate the navigation data of the previous sub-frame.
        // The COP field bounds how much older the stored data may be; a tag
        // whose lookup finds nothing resolves to unknown data.
        let data_gst = gst.add_seconds(-30);
        let data: Option<BitVec> = match record.adkd {
            Adkd::InavCed | Adkd::SlowMac => Svn::try_from(record.prnd).ok().and_then(|prnd| {
                navdata
                    .get_ced(prnd, data_gst, record.cop)
                    .map(|d| BitVec::from_bitslice(d.bits()))
            }),
            Adkd::InavTiming => navdata
                .get_timing(data_gst, record.cop)
                .map(|d| BitVec::from_bitslice(d.bits())),
            Adkd::Reserved => None,
        };
        let Some(data) = data else {
            return AuthOutcome::UnknownData;
        };
        let ok = if record.is_tag0 {
            key.validate_tag0(&record.tag, gst, prna, nma_status, &data)
        } else {
            key.validate_tag(
                &record.tag,
                gst,
                record.prnd,
                prna,
                record.ctr,
                nma_status,
                &data,
            )
        };
        if ok {
            AuthOutcome::Ok
        } else {
            AuthOutcome::InvalidTag
        }
    }

    /// Abandons tags whose resolving key is overdue.
    ///
    /// A tag authored at epoch `g` waits `2 · key-delay` sub-frames for its
    /// key; past that it resolves to [`AuthOutcome::MissingKey`] and is
    /// dropped.
    pub fn evict(&mut self, now: Gst, emit: &mut dyn FnMut(Event)) {
        let mut done = Vec::new();
        for (&(gst, prna_id), group) in self.groups.iter_mut() {
            let age = now.timestamp().saturating_sub(gst.timestamp());
            for record in &mut group.tags {
                if record.resolved {
                    continue;
                }
                let window = u64::from(2 * record.adkd.key_delay()) * 30;
                if age > window {
                    record.resolved = true;
                    emit(Event::AuthAttempt {
                        prnd: record.prnd,
                        prna: prna_id,
                        wn: gst.wn(),
                        tow: gst.tow(),
                        adkd: record.adkd.value(),
                        outcome: AuthOutcome::MissingKey,
                    });
                }
            }
            if group.all_resolved() {
                done.push((gst, prna_id));
            }
        }
        for group_key in done {
            self.groups.remove(&group_key);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::MackMessage;
    use hex_literal::hex;

    // Collection and eviction can be tested without authentic keys; the
    // resolution path is exercised end-to-end in the engine tests.
    #[test]
    fn collect_and_evict() {
        // MACK broadcast by E21 on 2022-03-07 (tow 120930, MACLT 33)
        let mack_bytes: MackMessage = hex!(
            "
            11 55 d3 71 f2 1f 30 a8 e4 ec e0 c0 1b 07 6d 17
            7d 64 03 12 05 d4 02 7e 77 13 15 c0 4c ca 1c 16
            99 1a 05 48 91 07 a7 f7 0e c5 42 b4 19 da 6a da
            1c 0a 3d 6f 56 a5 e5 dc 59 a7 00 00"
        );
        let mack = Mack::new(&mack_bytes, 128, 40);
        let gst = Gst::new(1176, 120930);
        let prna = Svn::try_from(21u8).unwrap();
        let mut pending = PendingTags::new();
        pending
            .collect(&mack, prna, gst, NmaStatus::Test, 33)
            .unwrap();
        assert_eq!(pending.earliest(), Some(gst));

        // Three sub-frames later the four fast tags (tag0 and three CED
        // tags) are overdue; the two slow MAC tags keep waiting.
        let mut events = Vec::new();
        pending.evict(gst.add_subframes(3), &mut |e| events.push(e));
        let missing: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::AuthAttempt {
                        outcome: AuthOutcome::MissingKey,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(missing.len(), 4);

        // Past the slow MAC window everything is gone
        let mut events = Vec::new();
        pending.evict(gst.add_subframes(23), &mut |e| events.push(e));
        assert_eq!(events.len(), 2);
        assert_eq!(pending.earliest(), None);
    }

    #[test]
    fn wrong_sequence_not_enqueued() {
        let mack_bytes: MackMessage = hex!(
            "
            11 55 d3 71 f2 1f 30 a8 e4 ec e0 c0 1b 07 6d 17
            7d 64 03 12 05 d4 02 7e 77 13 15 c0 4c ca 1c 16
            99 1a 05 48 91 07 a7 f7 0e c5 42 b4 19 da 6a da
            1c 0a 3d 6f 56 a5 e5 dc 59 a7 00 00"
        );
        let mack = Mack::new(&mack_bytes, 128, 40);
        let gst = Gst::new(1176, 120930);
        // E22 did not transmit this MACK; the 12S slot betrays it
        let wrong = Svn::try_from(22u8).unwrap();
        let mut pending = PendingTags::new();
        assert!(pending
            .collect(&mack, wrong, gst, NmaStatus::Test, 33)
            .is_err());
        assert_eq!(pending.earliest(), None);
    }
}
