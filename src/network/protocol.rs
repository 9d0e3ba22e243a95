//! Protocol Messages
//!
//! Binary wire format shared by client and server. Every message starts
//! with the same 4-byte header:
//!
//! ```text
//! byte 0       message tag
//! bytes 1..3   payload length, little-endian 24-bit
//! bytes 4..    payload
//! ```
//!
//! Decoders never consume a partial message. They report "not ready"
//! (`Ok(false)`) until the whole declared payload has arrived, and only
//! fail (`Err`) when the bytes cannot be a valid message of their type.

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use crate::game::input::{Controls, Hand};
use crate::game::state::{Game, Player, PlayerHandle};
use crate::network::connection::Connection;

// =============================================================================
// FRAMING
// =============================================================================

/// Message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// Client -> server: current controls.
    Controls = 1,
    /// Server -> client: complete game state.
    State = b's',
}

impl MessageTag {
    /// Get tag from its wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageTag::Controls),
            b's' => Some(MessageTag::State),
            _ => None,
        }
    }
}

/// Size of the tag + length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload the 24-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 0x00ff_ffff;

/// Controls payload: one byte per button.
pub const CONTROLS_PAYLOAD_LEN: usize = Controls::BUTTON_COUNT;

/// State payload before the player records: score, over flag, player count.
pub const STATE_FIXED_LEN: usize = 3 * 4 + 1 + 1;

/// One player record: color, two hands, index, stamina, win flag.
pub const PLAYER_RECORD_LEN: usize = 4 + 1 + 1 + 1 + 4 + 1;

/// Structural protocol violations. The stream is unusable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Controls message whose length is not the fixed button count.
    #[error("Controls message with size {0} != {CONTROLS_PAYLOAD_LEN}")]
    BadControlsLength(u32),

    /// A field would extend past the declared payload.
    #[error("Ran out of bytes reading state message (needed {needed}, declared {declared})")]
    Truncated {
        /// Payload bytes required by the field being read
        needed: usize,
        /// Declared payload length
        declared: usize,
    },

    /// Bytes left over after every declared field.
    #[error("Trailing data in state message ({consumed} of {declared} bytes used)")]
    TrailingBytes {
        /// Payload bytes consumed by the fields
        consumed: usize,
        /// Declared payload length
        declared: usize,
    },

    /// Hand byte outside the gesture range.
    #[error("Invalid hand value {0}")]
    InvalidHand(u8),

    /// Boolean byte other than 0 or 1.
    #[error("Invalid bool value {0}")]
    InvalidBool(u8),

    /// More players than one count byte can describe.
    #[error("Too many players for one state message: {0}")]
    TooManyPlayers(usize),

    /// Payload does not fit the 24-bit length field.
    #[error("Payload of {0} bytes exceeds the length field")]
    PayloadTooLarge(usize),

    /// A message type this peer never expects.
    #[error("Unexpected message tag {0:#04x}")]
    UnexpectedTag(u8),
}

/// Tag and declared payload length at the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw tag byte
    pub tag: u8,
    /// Declared payload length
    pub len: usize,
}

impl FrameHeader {
    /// Parse the header, or `None` if fewer than four bytes are buffered.
    pub fn peek(buffer: &[u8]) -> Option<Self> {
        let header = buffer.get(..HEADER_LEN)?;
        let len = usize::from(header[1])
            | usize::from(header[2]) << 8
            | usize::from(header[3]) << 16;
        Some(Self { tag: header[0], len })
    }

    /// Total bytes of header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.len
    }

    /// Is the whole message buffered?
    pub fn is_complete(&self, buffer: &[u8]) -> bool {
        buffer.len() >= self.frame_len()
    }
}

/// Append one framed message to the connection's outgoing buffer.
pub fn write_frame(
    connection: &mut Connection,
    tag: MessageTag,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len = payload.len();
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(len));
    }

    let header = [tag as u8, len as u8, (len >> 8) as u8, (len >> 16) as u8];
    connection.send(&header);
    connection.send(payload);
    Ok(())
}

/// Short hex rendering of the front of a buffer, for logs.
pub fn hex_preview(buffer: &[u8]) -> String {
    const PREVIEW: usize = 32;
    let shown = &buffer[..buffer.len().min(PREVIEW)];
    if buffer.len() > PREVIEW {
        format!("{}.. ({} bytes)", hex::encode(shown), buffer.len())
    } else {
        hex::encode(shown)
    }
}

// =============================================================================
// CONTROLS MESSAGE (client -> server)
// =============================================================================

impl Controls {
    /// Queue a controls message: one byte per button, left hand first.
    pub fn send_controls_message(&self, connection: &mut Connection) {
        let mut payload = [0u8; CONTROLS_PAYLOAD_LEN];
        for (byte, button) in payload.iter_mut().zip(self.buttons()) {
            *byte = button.to_wire();
        }

        // A fixed 8-byte payload always fits the length field
        let header = [
            MessageTag::Controls as u8,
            CONTROLS_PAYLOAD_LEN as u8,
            0,
            0,
        ];
        connection.send(&header);
        connection.send(&payload);
    }

    /// Merge one controls message from the front of the receive buffer.
    ///
    /// Returns `Ok(false)` if nothing was consumed (no complete message,
    /// or the next message is of another type). Press edges accumulate
    /// across messages until the simulation consumes them.
    pub fn recv_controls_message(&mut self, connection: &mut Connection) -> Result<bool, ProtocolError> {
        let buffer = connection.recv_buffer();

        let Some(header) = FrameHeader::peek(buffer) else {
            return Ok(false);
        };
        if header.tag != MessageTag::Controls as u8 {
            return Ok(false);
        }
        if header.len != CONTROLS_PAYLOAD_LEN {
            return Err(ProtocolError::BadControlsLength(header.len as u32));
        }
        if !header.is_complete(buffer) {
            return Ok(false);
        }

        let payload = &buffer[HEADER_LEN..header.frame_len()];
        for (button, byte) in self.buttons_mut().zip(payload) {
            button.merge_wire(*byte);
        }

        connection.consume(header.frame_len());
        Ok(true)
    }
}

// =============================================================================
// STATE MESSAGE (server -> client)
// =============================================================================

/// Bounds-checked reader over one declared payload.
struct PayloadReader<'a> {
    payload: &'a [u8],
    declared: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self {
            payload,
            declared: payload.len(),
        }
    }

    fn consumed(&self) -> usize {
        self.declared - self.payload.remaining()
    }

    fn need(&self, size: usize) -> Result<(), ProtocolError> {
        if self.payload.remaining() < size {
            return Err(ProtocolError::Truncated {
                needed: self.consumed() + size,
                declared: self.declared,
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.payload.get_u8())
    }

    fn i8(&mut self) -> Result<i8, ProtocolError> {
        self.need(1)?;
        Ok(self.payload.get_i8())
    }

    fn f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.payload.get_f32_le())
    }

    fn bool(&mut self) -> Result<bool, ProtocolError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    fn hand(&mut self) -> Result<Hand, ProtocolError> {
        let value = self.u8()?;
        Hand::from_u8(value).ok_or(ProtocolError::InvalidHand(value))
    }

    fn color(&mut self) -> Result<[u8; 4], ProtocolError> {
        self.need(4)?;
        let mut color = [0u8; 4];
        self.payload.copy_to_slice(&mut color);
        Ok(color)
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.payload.has_remaining() {
            return Err(ProtocolError::TrailingBytes {
                consumed: self.consumed(),
                declared: self.declared,
            });
        }
        Ok(())
    }
}

fn put_player(payload: &mut BytesMut, player: &Player) {
    payload.put_slice(&player.color);
    payload.put_u8(player.left_hand as u8);
    payload.put_u8(player.right_hand as u8);
    payload.put_i8(player.index);
    payload.put_f32_le(player.stamina);
    payload.put_u8(u8::from(player.win));
}

fn read_player(reader: &mut PayloadReader<'_>) -> Result<Player, ProtocolError> {
    let color = reader.color()?;
    let left_hand = reader.hand()?;
    let right_hand = reader.hand()?;
    let index = reader.i8()?;
    let stamina = reader.f32()?;
    let win = reader.bool()?;

    Ok(Player {
        color,
        left_hand,
        right_hand,
        index,
        stamina,
        win,
        ..Player::default()
    })
}

impl Game {
    /// Queue a state message carrying the whole game.
    ///
    /// The `prioritized` player, if present, is written first so a client
    /// can find itself as the first record; everyone else follows in
    /// storage order.
    pub fn send_state_message(
        &self,
        connection: &mut Connection,
        prioritized: Option<PlayerHandle>,
    ) -> Result<(), ProtocolError> {
        let count = self.player_count();
        let count_byte = u8::try_from(count).map_err(|_| ProtocolError::TooManyPlayers(count))?;

        // Payload goes to a scratch buffer so the length is known up front
        let mut payload = BytesMut::with_capacity(STATE_FIXED_LEN + count * PLAYER_RECORD_LEN);
        for score in self.bary_score {
            payload.put_f32_le(score);
        }
        payload.put_u8(u8::from(self.over));
        payload.put_u8(count_byte);

        let first = prioritized.and_then(|handle| self.player(handle).map(|p| (handle, p)));
        if let Some((_, player)) = first {
            put_player(&mut payload, player);
        } else if let Some(handle) = prioritized {
            debug!(%handle, "prioritized player not in game");
        }
        for (handle, player) in self.players() {
            if first.is_some_and(|(h, _)| h == handle) {
                continue;
            }
            put_player(&mut payload, player);
        }

        write_frame(connection, MessageTag::State, &payload)
    }

    /// Replace this game with one state message from the front of the
    /// receive buffer.
    ///
    /// Returns `Ok(false)` if nothing was consumed. On success the whole
    /// player collection is replaced; nothing is merged.
    pub fn recv_state_message(&mut self, connection: &mut Connection) -> Result<bool, ProtocolError> {
        let buffer = connection.recv_buffer();

        let Some(header) = FrameHeader::peek(buffer) else {
            return Ok(false);
        };
        if header.tag != MessageTag::State as u8 {
            return Ok(false);
        }
        if !header.is_complete(buffer) {
            return Ok(false);
        }

        let mut reader = PayloadReader::new(&buffer[HEADER_LEN..header.frame_len()]);

        let bary_score = [reader.f32()?, reader.f32()?, reader.f32()?];
        let over = reader.bool()?;
        let player_count = reader.u8()?;

        let mut players = Vec::with_capacity(usize::from(player_count));
        for _ in 0..player_count {
            players.push(read_player(&mut reader)?);
        }

        reader.finish()?;

        self.bary_score = bary_score;
        self.over = over;
        self.replace_players(players);

        connection.consume(header.frame_len());
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{Button, HandSide};
    use crate::game::state::MAX_STAMINA;
    use proptest::prelude::*;

    fn sample_game() -> (Game, Vec<PlayerHandle>) {
        let mut game = Game::new();
        let handles: Vec<_> = (0..3).map(|_| game.spawn_player().unwrap()).collect();
        game.bary_score = [0.25, 0.5, 0.25];
        {
            let p = game.player_mut(handles[1]).unwrap();
            p.left_hand = Hand::Rock;
            p.right_hand = Hand::Scissors;
            p.stamina = -1.5;
            p.win = true;
        }
        game.player_mut(handles[2]).unwrap().left_hand = Hand::None;
        (game, handles)
    }

    /// The fields that travel on the wire, in storage order.
    fn wire_view(game: &Game) -> Vec<([u8; 4], Hand, Hand, i8, f32, bool)> {
        game.players()
            .map(|(_, p)| (p.color, p.left_hand, p.right_hand, p.index, p.stamina, p.win))
            .collect()
    }

    #[test]
    fn test_controls_wire_layout() {
        let mut controls = Controls::default();
        controls.press(HandSide::Left, 0);
        controls.press(HandSide::Left, 0);
        controls.press(HandSide::Right, 3);
        controls.release(HandSide::Right, 3);

        let mut conn = Connection::new(0);
        controls.send_controls_message(&mut conn);

        assert_eq!(
            conn.send_buffer(),
            &[1, 8, 0, 0, 0x82, 0, 0, 0, 0, 0, 0, 0x01]
        );
    }

    #[test]
    fn test_controls_roundtrip() {
        let mut sent = Controls::default();
        sent.left_buttons[1] = Button { downs: 3, pressed: true };
        sent.right_buttons[2] = Button { downs: 0x7f, pressed: false };
        sent.right_buttons[3] = Button { downs: 0, pressed: true };

        let mut conn = Connection::new(0);
        sent.send_controls_message(&mut conn);
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        let mut received = Controls::default();
        assert_eq!(received.recv_controls_message(&mut conn), Ok(true));
        assert_eq!(received, sent);
        assert!(conn.recv_buffer().is_empty());
    }

    #[test]
    fn test_controls_merge_accumulates_downs() {
        let mut sent = Controls::default();
        sent.left_buttons[0] = Button { downs: 100, pressed: true };

        let mut conn = Connection::new(0);
        sent.send_controls_message(&mut conn);
        sent.left_buttons[0] = Button { downs: 100, pressed: false };
        sent.send_controls_message(&mut conn);
        sent.send_controls_message(&mut conn);
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        let mut received = Controls::default();
        while received.recv_controls_message(&mut conn).unwrap() {}

        // 300 press edges saturate, held state follows the latest message
        assert_eq!(received.left_buttons[0], Button { downs: 255, pressed: false });
        assert!(conn.recv_buffer().is_empty());
    }

    #[test]
    fn test_controls_bad_length_is_fatal() {
        let mut conn = Connection::new(0);
        // Length is checked as soon as the header is in, before the body
        conn.receive(&[1, 9, 0, 0]);

        let mut controls = Controls::default();
        assert_eq!(
            controls.recv_controls_message(&mut conn),
            Err(ProtocolError::BadControlsLength(9))
        );
    }

    #[test]
    fn test_controls_ignores_other_tags() {
        let (game, _) = sample_game();
        let mut conn = Connection::new(0);
        game.send_state_message(&mut conn, None).unwrap();
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        let mut controls = Controls::default();
        assert_eq!(controls.recv_controls_message(&mut conn), Ok(false));
        assert_eq!(conn.recv_buffer().len(), bytes.len());
    }

    #[test]
    fn test_state_wire_layout() {
        let mut game = Game::new();
        game.spawn_player().unwrap();

        let mut conn = Connection::new(0);
        game.send_state_message(&mut conn, None).unwrap();
        let bytes = conn.send_buffer();

        let len = STATE_FIXED_LEN + PLAYER_RECORD_LEN;
        assert_eq!(bytes.len(), HEADER_LEN + len);
        assert_eq!(&bytes[..4], &[b's', len as u8, 0, 0]);
        assert_eq!(&bytes[4..8], &(1.0f32 / 3.0).to_le_bytes());
        assert_eq!(bytes[16], 0); // over
        assert_eq!(bytes[17], 1); // player count
        assert_eq!(&bytes[18..22], &[0xff, 0x00, 0x88, 0xff]);
        assert_eq!(bytes[22], Hand::Paper as u8);
        assert_eq!(bytes[23], Hand::Paper as u8);
        assert_eq!(bytes[24], 0); // index
        assert_eq!(&bytes[25..29], &16.0f32.to_le_bytes());
        assert_eq!(bytes[29], 0); // win
    }

    #[test]
    fn test_state_roundtrip() {
        let (mut sent, _) = sample_game();
        sent.over = true;

        let mut conn = Connection::new(0);
        sent.send_state_message(&mut conn, None).unwrap();
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        let mut mirror = Game::new();
        assert_eq!(mirror.recv_state_message(&mut conn), Ok(true));
        assert_eq!(mirror.bary_score, sent.bary_score);
        assert!(mirror.over);
        assert_eq!(wire_view(&mirror), wire_view(&sent));
        assert!(conn.recv_buffer().is_empty());
    }

    #[test]
    fn test_state_prioritized_player_first() {
        let (game, handles) = sample_game();

        let mut conn = Connection::new(0);
        game.send_state_message(&mut conn, Some(handles[2])).unwrap();
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        let mut mirror = Game::new();
        mirror.recv_state_message(&mut conn).unwrap();
        let indices: Vec<i8> = mirror.players().map(|(_, p)| p.index).collect();
        assert_eq!(indices, vec![2, 0, 1]);
    }

    #[test]
    fn test_state_replaces_players() {
        let mut mirror = Game::new();
        for _ in 0..3 {
            mirror.spawn_player().unwrap();
        }

        let mut server = Game::new();
        server.spawn_player().unwrap();

        let mut conn = Connection::new(0);
        server.send_state_message(&mut conn, None).unwrap();
        let bytes = conn.take_outgoing();
        conn.receive(&bytes);

        assert!(mirror.recv_state_message(&mut conn).unwrap());
        assert_eq!(mirror.player_count(), 1);
    }

    #[test]
    fn test_state_truncated_is_fatal() {
        // Declares 2 players but only carries one record
        let len = STATE_FIXED_LEN + PLAYER_RECORD_LEN;
        let mut message = vec![b's', len as u8, 0, 0];
        message.extend_from_slice(&[0u8; 12]);
        message.push(0);
        message.push(2);
        message.extend_from_slice(&[0u8; PLAYER_RECORD_LEN]);

        let mut conn = Connection::new(0);
        conn.receive(&message);

        let mut mirror = Game::new();
        assert_eq!(
            mirror.recv_state_message(&mut conn),
            Err(ProtocolError::Truncated { needed: len + 4, declared: len })
        );
    }

    #[test]
    fn test_state_trailing_bytes_is_fatal() {
        let len = STATE_FIXED_LEN + 1;
        let mut message = vec![b's', len as u8, 0, 0];
        message.extend_from_slice(&[0u8; 12]);
        message.push(0);
        message.push(0);
        message.push(0xaa);

        let mut conn = Connection::new(0);
        conn.receive(&message);

        let mut mirror = Game::new();
        assert_eq!(
            mirror.recv_state_message(&mut conn),
            Err(ProtocolError::TrailingBytes { consumed: STATE_FIXED_LEN, declared: len })
        );
    }

    #[test]
    fn test_state_invalid_hand_is_fatal() {
        let (game, _) = sample_game();
        let mut conn = Connection::new(0);
        game.send_state_message(&mut conn, None).unwrap();
        let mut bytes = conn.take_outgoing().to_vec();
        // left hand of the first record
        bytes[HEADER_LEN + STATE_FIXED_LEN + 4] = 9;
        conn.receive(&bytes);

        let mut mirror = Game::new();
        assert_eq!(mirror.recv_state_message(&mut conn), Err(ProtocolError::InvalidHand(9)));
    }

    #[test]
    fn test_frame_header_peek() {
        assert_eq!(FrameHeader::peek(&[1, 2, 3]), None);
        let header = FrameHeader::peek(&[b's', 0x01, 0x02, 0x03, 0xff]).unwrap();
        assert_eq!(header.len, 0x030201);
        assert_eq!(MessageTag::from_u8(header.tag), Some(MessageTag::State));
        assert_eq!(MessageTag::from_u8(7), None);
    }

    #[test]
    fn test_write_frame_rejects_oversized_payload() {
        let mut conn = Connection::new(0);
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            write_frame(&mut conn, MessageTag::State, &payload),
            Err(ProtocolError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
        );
        assert!(conn.send_buffer().is_empty());
    }

    #[test]
    fn test_hex_preview() {
        assert_eq!(hex_preview(&[0x01, 0xab]), "01ab");
        assert!(hex_preview(&[0u8; 40]).ends_with("(40 bytes)"));
    }

    fn state_bytes(game: &Game) -> Vec<u8> {
        let mut conn = Connection::new(0);
        game.send_state_message(&mut conn, None).unwrap();
        conn.take_outgoing().to_vec()
    }

    fn controls_bytes(controls: &Controls) -> Vec<u8> {
        let mut conn = Connection::new(0);
        controls.send_controls_message(&mut conn);
        conn.take_outgoing().to_vec()
    }

    fn button_strategy() -> impl Strategy<Value = Button> {
        (0u8..=0x7f, any::<bool>()).prop_map(|(downs, pressed)| Button { downs, pressed })
    }

    fn controls_strategy() -> impl Strategy<Value = Controls> {
        (prop::array::uniform4(button_strategy()), prop::array::uniform4(button_strategy()))
            .prop_map(|(left_buttons, right_buttons)| Controls { left_buttons, right_buttons })
    }

    fn hand_strategy() -> impl Strategy<Value = Hand> {
        prop_oneof![
            Just(Hand::None),
            Just(Hand::Rock),
            Just(Hand::Paper),
            Just(Hand::Scissors),
        ]
    }

    fn player_strategy() -> impl Strategy<Value = Player> {
        (
            prop::array::uniform4(any::<u8>()),
            hand_strategy(),
            hand_strategy(),
            any::<i8>(),
            -1000.0f32..=MAX_STAMINA,
            any::<bool>(),
        )
            .prop_map(|(color, left_hand, right_hand, index, stamina, win)| Player {
                color,
                left_hand,
                right_hand,
                index,
                stamina,
                win,
                ..Player::default()
            })
    }

    /// A game as a mirror would hold it: only wire fields set.
    fn wire_game_strategy() -> impl Strategy<Value = Game> {
        (
            prop::array::uniform3(-2.0f32..2.0),
            any::<bool>(),
            prop::collection::vec(player_strategy(), 0..=3),
        )
            .prop_map(|(bary_score, over, players)| {
                let mut game = Game::new();
                game.bary_score = bary_score;
                game.over = over;
                game.replace_players(players);
                game
            })
    }

    proptest! {
        #[test]
        fn prop_state_roundtrip_any_game(first in wire_game_strategy(), second in wire_game_strategy()) {
            let mut conn = Connection::new(0);
            conn.receive(&state_bytes(&first));
            conn.receive(&state_bytes(&second));

            let mut mirror = Game::new();
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(true));
            prop_assert_eq!(&mirror, &first);
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(true));
            prop_assert_eq!(&mirror, &second);
            prop_assert!(conn.recv_buffer().is_empty());
        }

        #[test]
        fn prop_controls_roundtrip(controls in controls_strategy()) {
            let mut conn = Connection::new(0);
            conn.receive(&controls_bytes(&controls));

            let mut received = Controls::default();
            prop_assert_eq!(received.recv_controls_message(&mut conn), Ok(true));
            prop_assert_eq!(received, controls);
        }

        #[test]
        fn prop_state_prefix_is_not_ready(cut in 0usize..(HEADER_LEN + STATE_FIXED_LEN + 3 * PLAYER_RECORD_LEN)) {
            let (game, _) = sample_game();
            let bytes = state_bytes(&game);
            prop_assert!(cut < bytes.len());

            let mut conn = Connection::new(0);
            conn.receive(&bytes[..cut]);

            let mut mirror = Game::new();
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(false));
            prop_assert_eq!(conn.recv_buffer(), &bytes[..cut]);
            prop_assert_eq!(mirror.player_count(), 0);
        }

        #[test]
        fn prop_controls_prefix_is_not_ready(controls in controls_strategy(), cut in 0usize..(HEADER_LEN + CONTROLS_PAYLOAD_LEN)) {
            let bytes = controls_bytes(&controls);
            let mut conn = Connection::new(0);
            conn.receive(&bytes[..cut]);

            let mut received = Controls::default();
            prop_assert_eq!(received.recv_controls_message(&mut conn), Ok(false));
            prop_assert_eq!(conn.recv_buffer(), &bytes[..cut]);
            prop_assert_eq!(received, Controls::default());
        }

        #[test]
        fn prop_concatenated_messages_drain_in_order(first in controls_strategy(), second in controls_strategy()) {
            let mut conn = Connection::new(0);
            conn.receive(&controls_bytes(&first));
            conn.receive(&controls_bytes(&second));

            let mut received = Controls::default();
            prop_assert_eq!(received.recv_controls_message(&mut conn), Ok(true));
            prop_assert_eq!(received.left_buttons[0].pressed, first.left_buttons[0].pressed);
            prop_assert_eq!(received.recv_controls_message(&mut conn), Ok(true));
            prop_assert_eq!(received.recv_controls_message(&mut conn), Ok(false));
            prop_assert!(conn.recv_buffer().is_empty());

            // Held state from the latest message, edges summed across both
            for ((got, a), b) in received.buttons().zip(first.buttons()).zip(second.buttons()) {
                prop_assert_eq!(got.pressed, b.pressed);
                prop_assert_eq!(u32::from(got.downs), u32::from(a.downs) + u32::from(b.downs));
            }
        }

        #[test]
        fn prop_two_states_drain_in_order(over in any::<bool>(), score in -1.0f32..1.0) {
            let (mut game, _) = sample_game();
            let mut conn = Connection::new(0);
            conn.receive(&state_bytes(&game));
            game.over = over;
            game.bary_score[0] = score;
            conn.receive(&state_bytes(&game));

            let mut mirror = Game::new();
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(true));
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(true));
            prop_assert_eq!(mirror.recv_state_message(&mut conn), Ok(false));
            prop_assert!(conn.recv_buffer().is_empty());
            prop_assert_eq!(mirror.over, over);
            prop_assert_eq!(mirror.bary_score[0], score);
        }
    }
}
