//! Transition tables for the standard session phases.
//!
//! Connect hands off to authenticate through the last saved pattern; the
//! command phase runs once per command; disconnect tears the session down.

use std::sync::Arc;

use doorway_patterns::{Pattern, PatternSet};
use doorway_types::State;

use crate::actions::{
    abort, disconnect, fail, save_pattern, send_enable_password, send_line, send_newline,
    send_password, send_raw, send_username, sequence, Failure,
};
use crate::table::{Trigger, TransitionTable};

pub const CONNECT: &str = "CONNECT";
pub const AUTHENTICATE: &str = "AUTHENTICATE";
pub const ENABLE: &str = "ENABLE";
pub const COMMAND: &str = "COMMAND";
pub const DISCONNECT: &str = "DISCONNECT";

/// Wait for the session to come up.
///
/// States: 0 start, 1 client connected (escape banner seen), 2 newline sent
/// after silence.
pub fn connect_table(patterns: &PatternSet) -> TransitionTable {
    let p = patterns;
    TransitionTable::builder()
        .on([&p.connection_refused, &p.unable_to_connect], [0, 1, 2], State::END, Some(fail(Failure::UnableToConnect)), None)
        .on(
            [&p.standby],
            [0, 1, 2],
            State::END,
            Some(sequence(vec![disconnect(), abort("standby console disabled")])),
            None,
        )
        .on([&p.escape_char], [0], State(1), None, None)
        .on([&p.press_return], [0, 1, 2], State(1), Some(send_newline()), None)
        .on([&p.username, &p.password], [0, 1, 2], State::END, Some(save_pattern()), None)
        .on([&p.prompt], [0, 1, 2], State::END, Some(save_pattern()), None)
        .on([&p.connection_closed], [0, 1, 2], State::END, Some(fail(Failure::UnableToConnect)), None)
        .on([Trigger::Timeout], [0, 1], State(2), Some(send_newline()), None)
        .build()
}

/// Log in, starting from the pattern the connect phase saved.
///
/// States: 0 start, 1 username sent, 2 password sent.
pub fn authenticate_table(patterns: &PatternSet) -> TransitionTable {
    let p = patterns;
    TransitionTable::builder()
        .on([&p.auth_failed], [0, 1, 2], State::END, Some(fail(Failure::Authentication)), None)
        .on([&p.username], [0], State(1), Some(send_username()), None)
        .on([&p.password], [0, 1], State(2), Some(send_password()), None)
        // Asked again after credentials went out: rejected.
        .on([&p.username], [1, 2], State::END, Some(fail(Failure::Authentication)), None)
        .on([&p.password], [2], State::END, Some(fail(Failure::Authentication)), None)
        .on([&p.prompt], [0, 1, 2], State::END, Some(save_pattern()), None)
        .on([&p.connection_closed], [0, 1, 2], State::END, Some(fail(Failure::Authentication)), None)
        .build()
}

/// Enter privileged mode; expects `enable` to have been sent already.
///
/// States: 0 waiting for the password prompt, 1 enable password sent.
/// `privileged` must only match the `#` form of the prompt.
pub fn enable_table(patterns: &PatternSet, privileged: &Arc<Pattern>) -> TransitionTable {
    let p = patterns;
    TransitionTable::builder()
        .on([&p.auth_failed], [0, 1], State::END, Some(fail(Failure::Authentication)), None)
        .on([&p.password], [0], State(1), Some(send_enable_password()), None)
        .on([&p.password], [1], State::END, Some(fail(Failure::Authentication)), None)
        .on([privileged], [0, 1], State::END, None, None)
        // Back at the user-mode prompt: the password was not accepted.
        .on([&p.prompt], [1], State::END, Some(fail(Failure::Authentication)), None)
        .on([&p.syntax_error], [0], State::END, Some(fail(Failure::CommandSyntax)), None)
        .build()
}

/// Collect one command's output up to `prompt`, paging through
/// `--More--` markers.
pub fn command_table(patterns: &PatternSet, prompt: &Arc<Pattern>) -> TransitionTable {
    let p = patterns;
    TransitionTable::builder()
        .on([&p.more], [0], State(0), Some(send_raw(" ")), None)
        .on([&p.syntax_error], [0], State::END, Some(fail(Failure::CommandSyntax)), None)
        .on([prompt], [0], State::END, None, None)
        .build()
}

/// Leave the session; expects `exit` to have been sent already.
pub fn disconnect_table(patterns: &PatternSet) -> TransitionTable {
    let p = patterns;
    TransitionTable::builder()
        .on([&p.connection_closed], [0, 1], State::END, None, None)
        .on([Trigger::EndOfStream], [0, 1], State::END, None, None)
        // Still logged in somewhere along the chain.
        .on([&p.prompt], [0, 1], State(1), Some(send_line("exit")), None)
        .on([Trigger::Timeout], [0, 1], State::END, None, None)
        .build()
}
