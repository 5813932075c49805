//! Invitation Worker - Entry Point
//!
//! Sends the invitation email for every invitation document created under an event.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    eventmate_invitation_worker::run().await
}
