use clap::{Parser, Subcommand};

/// Opzenix CI/CD governance: roles, approvals, environment locks
#[derive(Parser, Debug)]
#[command(name = "opzenix", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (defaults to OPZENIX_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage account roles
    Role {
        #[command(subcommand)]
        command: RoleCommands,
    },

    /// Manage approval requests
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// Manage environment locks
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },

    /// Check whether a user may perform an action in an environment
    Can {
        #[arg(long)]
        user: String,
        /// view, approve, deploy, rollback, break_glass
        #[arg(long)]
        action: String,
        #[arg(long)]
        environment: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RoleCommands {
    /// Assign an account role (admin, operator, viewer)
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: String,
    },
    /// Show a user's resolved roles and permissions
    Show {
        #[arg(long)]
        user: String,
    },
    /// List all role assignments
    List,
}

#[derive(Subcommand, Debug)]
pub enum ApprovalCommands {
    /// List approval requests
    List {
        /// pending, approved or rejected
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Open an approval request
    Create {
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        environment: String,
        #[arg(long, default_value = "1")]
        required: i32,
    },
    /// Approve a pending request
    Approve {
        request_id: String,
        #[arg(long)]
        user: String,
        #[arg(short, long)]
        comment: String,
    },
    /// Reject a pending request
    Reject {
        request_id: String,
        #[arg(long)]
        user: String,
        #[arg(short, long)]
        comment: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum LockCommands {
    /// List environment locks
    List,
    /// Lock an environment
    Lock {
        environment: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Unlock an environment
    Unlock {
        environment: String,
        #[arg(long)]
        user: String,
        #[arg(short, long)]
        comment: String,
    },
}
