//! Microsoft identity platform and Graph constants

use std::time::Duration;

/// Graph endpoint root. Enrollment program settings are only exposed on beta.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/beta";

/// Authority host for the v2.0 token endpoint.
pub const AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// App-only scope: every application permission granted to the client.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Cached tokens are replaced once they expire within this margin.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);
