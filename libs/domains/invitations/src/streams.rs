//! Stream definition for invitation triggers.

use stream_worker::StreamDef;

/// One entry per created `events/{eventId}/invitations/{invitationId}` document.
pub struct InvitationStream;

impl StreamDef for InvitationStream {
    const STREAM_NAME: &'static str = "events:invitations";

    const CONSUMER_GROUP: &'static str = "invitation_notifiers";
}
