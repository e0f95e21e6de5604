//! Byte-exact decoding of the kernel producer's fixed-layout records (§6).
//! Fields are packed little-endian integers; a record is tagged by a
//! leading `event_type` byte.

use bytes::Buf;

use crate::error::DecodeError;

pub const EVENT_TYPE_SCHED_SWITCH: u8 = 0;
pub const EVENT_TYPE_IRQ: u8 = 1;
pub const EVENT_TYPE_PAGE_CACHE_HIT: u8 = 2;
pub const EVENT_TYPE_FREE: u8 = 3;

pub const IRQ_NET_TX: u8 = 2;
pub const IRQ_NET_RX: u8 = 3;
pub const IRQ_BLOCK: u8 = 4;

/// A decoded kernel trace record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    SchedSwitch {
        cpu_id: u32,
        on_tid: u32,
        on_pid: u32,
        off_tid: u32,
        off_pid: u32,
        off_cgroup_id: u64,
        timestamp_ns: u64,
        cpu_cycles: u64,
        cpu_instructions: u64,
        cache_misses: u64,
    },
    Irq {
        pid: u32,
        irq_number: u8,
    },
    PageCacheHit {
        pid: u32,
    },
    Free {
        pid: u32,
    },
}

const SCHED_SWITCH_LEN: usize = 4 + 4 + 4 + 4 + 4 + 8 + 8 + 8 + 8 + 8; // 60
const IRQ_LEN: usize = 4 + 1; // 5
const PAGE_CACHE_HIT_LEN: usize = 4;
const FREE_LEN: usize = 4;

/// Decode one record from the front of `buf`. `buf` must start with the
/// `event_type` tag byte followed by the record's fixed-width fields.
/// Returns the decoded event and advances `buf` past the consumed bytes.
pub fn decode_one(buf: &mut impl Buf) -> Result<RawEvent, DecodeError> {
    if !buf.has_remaining() {
        return Err(DecodeError::Truncated { need: 1, have: 0 });
    }
    let tag = buf.get_u8();
    match tag {
        EVENT_TYPE_SCHED_SWITCH => {
            require(buf, SCHED_SWITCH_LEN)?;
            Ok(RawEvent::SchedSwitch {
                cpu_id: buf.get_u32_le(),
                on_tid: buf.get_u32_le(),
                on_pid: buf.get_u32_le(),
                off_tid: buf.get_u32_le(),
                off_pid: buf.get_u32_le(),
                off_cgroup_id: buf.get_u64_le(),
                timestamp_ns: buf.get_u64_le(),
                cpu_cycles: buf.get_u64_le(),
                cpu_instructions: buf.get_u64_le(),
                cache_misses: buf.get_u64_le(),
            })
        }
        EVENT_TYPE_IRQ => {
            require(buf, IRQ_LEN)?;
            Ok(RawEvent::Irq {
                pid: buf.get_u32_le(),
                irq_number: buf.get_u8(),
            })
        }
        EVENT_TYPE_PAGE_CACHE_HIT => {
            require(buf, PAGE_CACHE_HIT_LEN)?;
            Ok(RawEvent::PageCacheHit { pid: buf.get_u32_le() })
        }
        EVENT_TYPE_FREE => {
            require(buf, FREE_LEN)?;
            Ok(RawEvent::Free { pid: buf.get_u32_le() })
        }
        other => Err(DecodeError::UnknownEventType(other)),
    }
}

fn require(buf: &impl Buf, need: usize) -> Result<(), DecodeError> {
    if buf.remaining() < need {
        Err(DecodeError::Truncated { need, have: buf.remaining() })
    } else {
        Ok(())
    }
}

/// Decode every complete record in `buf`, stopping (without error) at a
/// trailing partial record. Malformed tags are logged and skipped by the
/// caller (data anomaly, §7 kind 4) — this function surfaces them instead
/// of silently dropping so the caller can decide how to log them.
pub fn decode_all(mut buf: impl Buf) -> Vec<Result<RawEvent, DecodeError>> {
    let mut out = Vec::new();
    while buf.has_remaining() {
        match decode_one(&mut buf) {
            Ok(ev) => out.push(Ok(ev)),
            Err(DecodeError::Truncated { .. }) => break,
            Err(e) => {
                out.push(Err(e));
                break; // unknown tag desyncs the stream; stop here.
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode_sched_switch() -> BytesMut {
        let mut b = BytesMut::new();
        b.extend_from_slice(&[EVENT_TYPE_SCHED_SWITCH]);
        b.extend_from_slice(&1u32.to_le_bytes()); // cpu_id
        b.extend_from_slice(&2u32.to_le_bytes()); // on_tid
        b.extend_from_slice(&3u32.to_le_bytes()); // on_pid
        b.extend_from_slice(&4u32.to_le_bytes()); // off_tid
        b.extend_from_slice(&5u32.to_le_bytes()); // off_pid
        b.extend_from_slice(&6u64.to_le_bytes()); // off_cgroup_id
        b.extend_from_slice(&7u64.to_le_bytes()); // timestamp_ns
        b.extend_from_slice(&8u64.to_le_bytes()); // cpu_cycles
        b.extend_from_slice(&9u64.to_le_bytes()); // cpu_instructions
        b.extend_from_slice(&10u64.to_le_bytes()); // cache_misses
        b
    }

    #[test]
    fn decodes_sched_switch() {
        let mut b = encode_sched_switch();
        let ev = decode_one(&mut b).unwrap();
        assert_eq!(
            ev,
            RawEvent::SchedSwitch {
                cpu_id: 1,
                on_tid: 2,
                on_pid: 3,
                off_tid: 4,
                off_pid: 5,
                off_cgroup_id: 6,
                timestamp_ns: 7,
                cpu_cycles: 8,
                cpu_instructions: 9,
                cache_misses: 10,
            }
        );
        assert_eq!(b.remaining(), 0);
    }

    #[test]
    fn decodes_irq() {
        let mut b = BytesMut::new();
        b.extend_from_slice(&[EVENT_TYPE_IRQ]);
        b.extend_from_slice(&42u32.to_le_bytes());
        b.extend_from_slice(&[IRQ_NET_RX]);
        let ev = decode_one(&mut b).unwrap();
        assert_eq!(ev, RawEvent::Irq { pid: 42, irq_number: IRQ_NET_RX });
    }

    #[test]
    fn truncated_record_is_reported_not_panicking() {
        let mut b = BytesMut::new();
        b.extend_from_slice(&[EVENT_TYPE_SCHED_SWITCH]);
        b.extend_from_slice(&1u32.to_le_bytes());
        let err = decode_one(&mut b).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let mut b = BytesMut::new();
        b.extend_from_slice(&[0xFF]);
        let err = decode_one(&mut b).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEventType(0xFF)));
    }

    #[test]
    fn decode_all_stops_cleanly_at_trailing_partial() {
        let mut buf = encode_sched_switch();
        buf.extend_from_slice(&[EVENT_TYPE_FREE]);
        buf.extend_from_slice(&77u32.to_le_bytes());
        buf.extend_from_slice(&[EVENT_TYPE_IRQ]); // partial trailing record
        let results = decode_all(buf);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap(), &RawEvent::Free { pid: 77 });
    }
}
