//! S101 frame encoder/decoder.
//!
//! S101 is the byte-stuffed framing layer that carries Glow payloads over a
//! stream transport. This crate handles the pure byte-level work: escaping,
//! CRC, splitting a stream into frames, and re-assembling multi-packet
//! messages.
//!
//! # Frame format
//!
//! ```text
//! 0xFE <header: 9 bytes> <escaped payload...> <escaped CRC lo, hi> 0xFF
//! ```
//!
//! - Begin-of-frame marker: `0xFE`
//! - Header: slot, message type, command, version, packet type, DTD,
//!   app-byte count, DTD minor, DTD major (never escaped)
//! - Payload: Glow data, bytes `>= 0xF8` escape-prefixed with `0xFD` and
//!   XORed with `0x20`
//! - CRC-16 over header + unescaped payload, low byte first, then escaped
//! - End-of-frame marker: `0xFF`
//!
//! A logical message is either one single-packet frame, or a first-multi
//! frame followed by body-multi frames and a final last-multi frame. A
//! request emitted with packet type [`FIRST_MULTI_PACKET`] is always
//! followed by an empty last-multi frame.

use emberlib_core::{Error, Result};

/// Begin-of-frame marker.
pub const BOF: u8 = 0xFE;

/// End-of-frame marker.
pub const EOF: u8 = 0xFF;

/// Escape prefix byte. The byte following it is XORed with [`ESCAPE_XOR`].
pub const ESCAPE: u8 = 0xFD;

/// XOR applied to the byte following an escape prefix.
pub const ESCAPE_XOR: u8 = 0x20;

/// Lowest byte value that must be escaped inside a frame.
pub const ESCAPE_MIN: u8 = 0xF8;

/// Packet type of a message that fits in one frame.
pub const SINGLE_PACKET: u8 = 0xC0;

/// Packet type of the first frame of a multi-packet message.
pub const FIRST_MULTI_PACKET: u8 = 0x80;

/// Packet type of an intermediate frame of a multi-packet message.
pub const BODY_MULTI_PACKET: u8 = 0x60;

/// Packet type of the final frame of a multi-packet message.
pub const LAST_MULTI_PACKET: u8 = 0x40;

// S101 header constants, emitted verbatim on every request and tolerated on
// responses.
const SLOT: u8 = 0x00;
const MESSAGE_TYPE_EMBER: u8 = 0x0E;
const COMMAND_EMBER: u8 = 0x00;
const FRAMING_VERSION: u8 = 0x01;
const DTD_GLOW: u8 = 0x01;
const APP_BYTE_COUNT: u8 = 0x02;
// Glow DTD version 2.31, minor before major.
const DTD_VERSION_MINOR: u8 = 0x1F;
const DTD_VERSION_MAJOR: u8 = 0x02;

const HEADER_LEN: usize = 9;
const CRC_LEN: usize = 2;
/// BOF + header + CRC + EOF; the shortest well-formed frame carries an
/// empty payload.
const MIN_FRAME_LEN: usize = 1 + HEADER_LEN + CRC_LEN + 1;

/// Offset of the packet-type byte within the 9-byte header.
const PACKET_TYPE_OFFSET: usize = 4;

/// Encode a Glow payload into one or two S101 frames.
///
/// The CRC is computed over the header and the unescaped payload; payload
/// and CRC are then escaped. When `packet_type` is [`FIRST_MULTI_PACKET`],
/// a last-multi frame with an empty payload is appended, as the protocol
/// requires for request emission.
///
/// # Example
///
/// ```
/// use emberlib_s101::{encode, SINGLE_PACKET, BOF, EOF};
///
/// let frame = encode(&[0x60, 0x00, 0x00], SINGLE_PACKET);
/// assert_eq!(frame[0], BOF);
/// assert_eq!(*frame.last().unwrap(), EOF);
/// ```
pub fn encode(payload: &[u8], packet_type: u8) -> Vec<u8> {
    let mut out = build_frame(payload, packet_type);
    if packet_type == FIRST_MULTI_PACKET {
        out.extend_from_slice(&build_frame(&[], LAST_MULTI_PACKET));
    }
    out
}

/// Split a raw byte stream into complete frames plus any unterminated tail.
///
/// A BOF resets any frame in progress: providers never nest BOF inside a
/// frame, so a second BOF means the earlier bytes were noise. Bytes outside
/// a frame are discarded. If the stream ends after a BOF but before the
/// matching EOF, the partial frame is returned as `trailing` for the caller
/// to prepend to the next read.
///
/// An empty input is an error
/// ([`Error::TransportEnded`](emberlib_core::Error::TransportEnded)).
pub fn split_frames(input: &[u8]) -> Result<(Vec<Vec<u8>>, Vec<u8>)> {
    if input.is_empty() {
        return Err(Error::TransportEnded);
    }

    let mut frames = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    for &b in input {
        if b == BOF {
            current = Some(vec![BOF]);
            continue;
        }

        if let Some(frame) = current.as_mut() {
            frame.push(b);
            if b == EOF {
                frames.push(current.take().expect("frame in progress"));
            }
        }
    }

    Ok((frames, current.unwrap_or_default()))
}

/// Decode a sequence of frames into the carried Glow payload.
///
/// Each frame is stripped of its markers, de-escaped, CRC-checked, and
/// stripped of its header; the remaining payload bytes are concatenated in
/// order. The returned packet-type byte comes from the final frame and
/// tells the caller whether the logical message continues.
///
/// A CRC mismatch is logged but does not reject the frame -- some deployed
/// providers emit frames the reference tooling accepts despite the
/// checksum.
pub fn decode_message(frames: &[Vec<u8>]) -> Result<(Vec<u8>, u8)> {
    if frames.is_empty() {
        return Err(Error::MalformedFrame("no frames to decode".into()));
    }

    let mut payload = Vec::new();
    let mut last_packet_type = 0u8;

    for frame in frames {
        if frame.len() < MIN_FRAME_LEN {
            return Err(Error::MalformedFrame(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }
        if frame[0] != BOF || frame[frame.len() - 1] != EOF {
            return Err(Error::MalformedFrame("missing frame markers".into()));
        }

        let body = unescape(&frame[1..frame.len() - 1])?;
        if body.len() < HEADER_LEN + CRC_LEN {
            return Err(Error::MalformedFrame(format!(
                "frame body too short: {} bytes",
                body.len()
            )));
        }

        let (data, crc_trailer) = body.split_at(body.len() - CRC_LEN);
        let received = u16::from_le_bytes([crc_trailer[0], crc_trailer[1]]);
        let computed = crc16(data);
        if received != computed {
            tracing::warn!(
                "frame CRC mismatch (received {received:04X}, computed {computed:04X}), \
                 accepting frame anyway"
            );
        }

        payload.extend_from_slice(&data[HEADER_LEN..]);
        last_packet_type = data[PACKET_TYPE_OFFSET];
    }

    Ok((payload, last_packet_type))
}

/// Compute the S101 CRC-16 (CCITT polynomial 0x1021 in reflected form,
/// seed 0xFFFF, final complement). Transmitted low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= u16::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0x8408 } else { crc >> 1 };
        }
    }
    !crc
}

fn build_frame(payload: &[u8], packet_type: u8) -> Vec<u8> {
    let header = [
        SLOT,
        MESSAGE_TYPE_EMBER,
        COMMAND_EMBER,
        FRAMING_VERSION,
        packet_type,
        DTD_GLOW,
        APP_BYTE_COUNT,
        DTD_VERSION_MINOR,
        DTD_VERSION_MAJOR,
    ];

    let mut crc_input = Vec::with_capacity(header.len() + payload.len());
    crc_input.extend_from_slice(&header);
    crc_input.extend_from_slice(payload);
    let crc = crc16(&crc_input);

    let mut out = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
    out.push(BOF);
    out.extend_from_slice(&header);
    escape_into(payload, &mut out);
    escape_into(&crc.to_le_bytes(), &mut out);
    out.push(EOF);
    out
}

/// Append `input` to `out`, escape-prefixing every byte `>= 0xF8`.
fn escape_into(input: &[u8], out: &mut Vec<u8>) {
    for &b in input {
        if b >= ESCAPE_MIN {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
}

/// Reverse the escape encoding. An escape prefix as the final byte is a
/// framing error.
fn unescape(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut iter = input.iter();
    while let Some(&b) = iter.next() {
        if b == ESCAPE {
            let &next = iter
                .next()
                .ok_or_else(|| Error::MalformedFrame("escape at frame tail".into()))?;
            out.push(next ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

/// Re-assembles logical Glow messages from raw transport reads.
///
/// Feed each chunk of received bytes to [`push`](MessageAssembler::push);
/// it buffers partial frames across reads, accumulates multi-packet
/// messages, and returns every logical message completed by the chunk.
///
/// Malformed frames are discarded with a log line and assembly continues
/// with the next frame. A single-packet message arriving in the middle of
/// a multi-packet sequence is dropped, matching provider tolerance in the
/// field.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    /// Unterminated frame bytes carried over from the previous read.
    trailing: Vec<u8>,
    /// Accumulated payload of an in-progress multi-packet message.
    partial: Vec<u8>,
    /// Whether a multi-packet message is in progress.
    in_multi: bool,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received bytes; returns the Glow payloads of all messages the
    /// bytes completed (possibly none).
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut input = std::mem::take(&mut self.trailing);
        input.extend_from_slice(bytes);

        let (frames, trailing) = split_frames(&input)?;
        self.trailing = trailing;

        let mut messages = Vec::new();
        for frame in &frames {
            let (glow, packet_type) = match decode_message(std::slice::from_ref(frame)) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::debug!(error = %e, "discarding malformed frame");
                    continue;
                }
            };

            match packet_type {
                FIRST_MULTI_PACKET | BODY_MULTI_PACKET => {
                    self.partial.extend_from_slice(&glow);
                    self.in_multi = true;
                }
                LAST_MULTI_PACKET => {
                    self.partial.extend_from_slice(&glow);
                    messages.push(std::mem::take(&mut self.partial));
                    self.in_multi = false;
                }
                _ => {
                    if self.in_multi {
                        tracing::debug!(
                            bytes = glow.len(),
                            "dropping single-packet message inside a multi-packet read"
                        );
                        continue;
                    }
                    messages.push(glow);
                }
            }
        }

        Ok(messages)
    }
}
