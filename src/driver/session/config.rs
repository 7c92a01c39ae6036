// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use super::bookmarks::{BookmarkManager, Bookmarks};
use crate::driver::config::auth::AuthToken;
use crate::driver::config::notification::NotificationFilter;
use crate::driver::config::ConfigureFetchSizeError;

/// Configuration for a [`Session`](super::Session).
///
/// Create one with [`SessionConfig::new()`] and pass it to [`Driver::session()`](crate::driver::Driver::session()).
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub(crate) database: Option<Arc<String>>,
    pub(crate) bookmarks: Option<Arc<Bookmarks>>,
    pub(crate) bookmark_manager: Option<Arc<dyn BookmarkManager>>,
    pub(crate) impersonated_user: Option<String>,
    pub(crate) auth: Option<Arc<AuthToken>>,
    pub(crate) notification_filter: NotificationFilter,
    pub(crate) fetch_size: Option<i64>,
}

impl SessionConfig {
    /// Create a new session configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify the database the session should operate on.
    ///
    /// While the driver is able to resolve the *home database* automatically, explicitly
    /// specifying a database where possible avoids the need for an extra round trip to find it
    /// out.
    pub fn with_database(mut self, database: Arc<String>) -> Self {
        self.database = Some(database);
        self
    }

    /// Let the server choose the default database for the session (this is the *default*).
    pub fn with_default_database(mut self) -> Self {
        self.database = None;
        self
    }

    /// Make the session start out [causally chained](crate#causal-consistency) from the given
    /// bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Arc<Bookmarks>) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    /// Don't seed the session with any bookmarks (this is the *default*).
    pub fn without_bookmarks(mut self) -> Self {
        self.bookmarks = None;
        self
    }

    /// Share a [`BookmarkManager`] between sessions to keep them
    /// [causally consistent](crate#causal-consistency) with each other.
    pub fn with_bookmark_manager(mut self, manager: Arc<dyn BookmarkManager>) -> Self {
        self.bookmark_manager = Some(manager);
        self
    }

    /// Don't use a bookmark manager (this is the *default*).
    pub fn without_bookmark_manager(mut self) -> Self {
        self.bookmark_manager = None;
        self
    }

    /// Impersonate a user for all work done in this session.
    ///
    /// The user the [`Driver`](crate::driver::Driver) authenticated as needs to have the
    /// appropriate permission to do so.
    pub fn with_impersonated_user(mut self, user: String) -> Self {
        self.impersonated_user = Some(user);
        self
    }

    /// Don't impersonate anyone (this is the *default*).
    pub fn without_impersonated_user(mut self) -> Self {
        self.impersonated_user = None;
        self
    }

    /// Use a different auth token for this session than the one the driver was configured with.
    ///
    /// This requires the server to support session-level re-authentication.
    pub fn with_session_auth(mut self, auth: Arc<AuthToken>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Use the driver's configured auth token for this session (this is the *default*).
    pub fn without_session_auth(mut self) -> Self {
        self.auth = None;
        self
    }

    /// Configure which notifications the server should send for work done in this session.
    ///
    /// Overwrites the default configured through
    /// [`DriverConfig::with_notification_filter()`](crate::driver::DriverConfig::with_notification_filter()).
    pub fn with_notification_filter(mut self, notification_filter: NotificationFilter) -> Self {
        self.notification_filter = notification_filter;
        self
    }

    /// Use the driver's configured notification filter for this session (this is the *default*).
    pub fn without_notification_filter(mut self) -> Self {
        self.notification_filter = NotificationFilter::default();
        self
    }

    /// Change the fetch size to fetch `fetch_size` records at once for this session.
    ///
    /// # Errors
    /// A [`ConfigureFetchSizeError`] is returned if `fetch_size` is greater than [`i64::MAX`].
    pub fn with_fetch_size(
        mut self,
        fetch_size: u64,
    ) -> Result<Self, ConfigureFetchSizeError<Self>> {
        match i64::try_from(fetch_size) {
            Ok(fetch_size) => {
                self.fetch_size = Some(fetch_size);
                Ok(self)
            }
            Err(_) => Err(ConfigureFetchSizeError { builder: self }),
        }
    }

    /// Fetch all records at once for this session.
    pub fn with_fetch_all(mut self) -> Self {
        self.fetch_size = Some(-1);
        self
    }

    /// Use the driver's configured fetch size for this session (this is the *default*).
    pub fn with_default_fetch_size(mut self) -> Self {
        self.fetch_size = None;
        self
    }
}

impl AsRef<SessionConfig> for SessionConfig {
    #[inline]
    fn as_ref(&self) -> &SessionConfig {
        self
    }
}

/// Internal session configuration, combining the user-facing [`SessionConfig`] with
/// driver-internal defaults that are not reconfigurable per session.
#[derive(Debug, Clone)]
pub(crate) struct InternalSessionConfig {
    pub(crate) config: SessionConfig,
    pub(crate) eager_begin: bool,
    pub(crate) idle_time_before_connection_test: Option<Duration>,
}
