//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Parser, Subcommand};

mod color_cmd;
mod control;
mod mailbox;
mod member;
mod runtime;
mod state;
mod team;

/// team-fs - filesystem state core for codex-teams
#[derive(Parser, Debug)]
#[command(
    name = "team-fs",
    version,
    about = "Filesystem state core for codex-teams",
    long_about = "Team config, file mailboxes, runtime records and control requests under <repo>/.codex-teams/<session>/"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a team in this session
    TeamCreate(team::TeamCreateArgs),

    /// Delete the session directory
    TeamDelete(team::TeamDeleteArgs),

    /// Print the team config
    TeamGet(team::TeamGetArgs),

    /// Add a member to the team
    MemberAdd(member::MemberAddArgs),

    /// Remove a member (the lead cannot be removed)
    MemberRemove(member::MemberRemoveArgs),

    /// Set a member's permission mode
    MemberMode(member::MemberModeArgs),

    /// Set permission modes for several members at once
    MemberBatchMode(member::MemberBatchModeArgs),

    /// Create a control request
    ControlRequest(control::ControlRequestArgs),

    /// Respond to a control request
    ControlRespond(control::ControlRespondArgs),

    /// List control requests for an agent
    ControlPending(control::ControlPendingArgs),

    /// Print one control request
    ControlGet(control::ControlGetArgs),

    /// Append a message to an agent's mailbox
    MailboxWrite(mailbox::MailboxWriteArgs),

    /// Read an agent's mailbox
    MailboxRead(mailbox::MailboxReadArgs),

    /// Mark mailbox messages read
    MailboxMarkRead(mailbox::MailboxMarkReadArgs),

    /// Render unread messages as teammate-message blocks
    MailboxFormat(mailbox::MailboxFormatArgs),

    /// Deliver a message with broadcast fan-out
    Dispatch(mailbox::DispatchArgs),

    /// Send a message to the team lead
    SendToLead(mailbox::SendToLeadArgs),

    /// Send an idle notification to the team lead
    SendIdle(mailbox::SendIdleArgs),

    /// Drain unread messages into the state replay queue
    InboxPoll(state::InboxPollArgs),

    /// Populate the state team context
    StateContextSet(state::StateContextSetArgs),

    /// Clear the state team context
    StateContextClear(state::StateContextClearArgs),

    /// Print the state blob
    StateGet(state::StateGetArgs),

    /// Upsert a runtime record
    RuntimeSet(runtime::RuntimeSetArgs),

    /// Update a runtime record's status
    RuntimeMark(runtime::RuntimeMarkArgs),

    /// List runtime records (pruning dead pids)
    RuntimeList(runtime::RuntimeListArgs),

    /// Kill an agent's process and mark it terminated
    RuntimeKill(runtime::RuntimeKillArgs),

    /// Map a palette color to a tmux border colour
    ColorMap(color_cmd::ColorMapArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::TeamCreate(args) => team::execute_create(args),
            Commands::TeamDelete(args) => team::execute_delete(args),
            Commands::TeamGet(args) => team::execute_get(args),
            Commands::MemberAdd(args) => member::execute_add(args),
            Commands::MemberRemove(args) => member::execute_remove(args),
            Commands::MemberMode(args) => member::execute_mode(args),
            Commands::MemberBatchMode(args) => member::execute_batch_mode(args),
            Commands::ControlRequest(args) => control::execute_request(args),
            Commands::ControlRespond(args) => control::execute_respond(args),
            Commands::ControlPending(args) => control::execute_pending(args),
            Commands::ControlGet(args) => control::execute_get(args),
            Commands::MailboxWrite(args) => mailbox::execute_write(args),
            Commands::MailboxRead(args) => mailbox::execute_read(args),
            Commands::MailboxMarkRead(args) => mailbox::execute_mark_read(args),
            Commands::MailboxFormat(args) => mailbox::execute_format(args),
            Commands::Dispatch(args) => mailbox::execute_dispatch(args),
            Commands::SendToLead(args) => mailbox::execute_send_to_lead(args),
            Commands::SendIdle(args) => mailbox::execute_send_idle(args),
            Commands::InboxPoll(args) => state::execute_inbox_poll(args),
            Commands::StateContextSet(args) => state::execute_context_set(args),
            Commands::StateContextClear(args) => state::execute_context_clear(args),
            Commands::StateGet(args) => state::execute_get(args),
            Commands::RuntimeSet(args) => runtime::execute_set(args),
            Commands::RuntimeMark(args) => runtime::execute_mark(args),
            Commands::RuntimeList(args) => runtime::execute_list(args),
            Commands::RuntimeKill(args) => runtime::execute_kill(args),
            Commands::ColorMap(args) => color_cmd::execute(args),
        }
    }
}
