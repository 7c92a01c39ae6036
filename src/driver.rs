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

mod config;
mod eager_result;
mod home_db_cache;
mod io;
pub mod record;
pub mod record_stream;
pub mod session;
pub mod summary;
pub mod transaction;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::Arc;

use config::notification::NotificationFilter;
use home_db_cache::HomeDbCache;
use io::bolt::message_parameters::TelemetryAPI;
use io::{Pool, PoolConfig};
use record_stream::RecordStream;
use session::bookmarks::{bookmark_managers, BookmarkManager};
use session::config::InternalSessionConfig;
use session::retry::RetryPolicy;
use session::{Session, SessionConfig};

pub use config::{ConnectionConfig, DriverConfig, KeepAliveConfig};
pub use eager_result::EagerResult;
pub use record::Record;

pub(crate) use config::auth;
pub(crate) use config::notification;

use crate::error_::Result;
use crate::value::ValueSend;

/// The entry point of this crate.
///
/// Use [`Driver::new()`] to create one, then use [`Driver::execute_query()`] or
/// [`Driver::session()`] to interact with the DBMS.
///
/// The driver manages a connection pool under the hood, so there's no need to create more than
/// one driver per application (per DBMS it needs to talk to).
/// It's fine (and cheap) to create a [`Session`] for every piece of work and drop it again once
/// done.
pub struct Driver {
    pool: Pool,
    home_db_cache: Arc<HomeDbCache>,
    execute_query_bookmark_manager: Arc<dyn BookmarkManager>,
    idle_time_before_connection_test: Option<std::time::Duration>,
    reduced_config: ReducedDriverConfig,
}

impl Debug for Driver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("pool", &self.pool)
            .field("reduced_config", &self.reduced_config)
            .finish()
    }
}

impl Driver {
    /// Create a new driver instance.
    ///
    /// `connection_config` tells the driver where and how to connect to the DBMS,
    /// `config` configures local driver behavior (e.g., authentication, connection pool sizing).
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    ///
    /// use neo4j::address::Address;
    /// use neo4j::driver::auth::AuthToken;
    /// use neo4j::driver::{ConnectionConfig, Driver, DriverConfig};
    ///
    /// let address = Address::from(("localhost", 7687));
    /// let auth_token = AuthToken::new_basic_auth("neo4j", "pass");
    /// let driver = Driver::new(
    ///     ConnectionConfig::new(address),
    ///     DriverConfig::new().with_auth(Arc::new(auth_token)),
    /// );
    /// ```
    pub fn new(connection_config: ConnectionConfig, config: DriverConfig) -> Self {
        let address = Arc::new(connection_config.address);
        let fetch_size = config.fetch_size;
        let idle_time_before_connection_test = config.idle_time_before_connection_test;
        let pool_config = PoolConfig {
            routing_context: connection_config.routing_context,
            tls_config: connection_config.tls_config.map(Arc::new),
            user_agent: config.user_agent,
            auth: config.auth,
            max_connection_lifetime: config.max_connection_lifetime,
            max_connection_pool_size: config.max_connection_pool_size,
            connection_timeout: config.connection_timeout,
            keep_alive: config.keep_alive,
            connection_acquisition_timeout: config.connection_acquisition_timeout,
            resolver: config.resolver,
            notification_filters: Arc::new(config.notification_filter),
            telemetry: config.telemetry,
        };
        Self {
            pool: Pool::new(address, pool_config),
            home_db_cache: Arc::new(HomeDbCache::default()),
            execute_query_bookmark_manager: Arc::new(bookmark_managers::simple(None)),
            idle_time_before_connection_test,
            reduced_config: ReducedDriverConfig { fetch_size },
        }
    }

    /// Spawn a new session.
    ///
    /// Sessions are cheap to create and provide [causal consistency](crate#causal-consistency)
    /// guarantees for the work performed through them.
    ///
    /// See [`SessionConfig`] for configuration options.
    pub fn session(&self, config: SessionConfig) -> Session<'_> {
        Session::new(
            InternalSessionConfig {
                config,
                eager_begin: true,
                idle_time_before_connection_test: self.idle_time_before_connection_test,
            },
            &self.pool,
            Arc::clone(&self.home_db_cache),
            &self.reduced_config,
        )
    }

    /// Get the [`BookmarkManager`] used by [`Driver::execute_query()`] by default.
    ///
    /// Sharing this with manually created sessions (see
    /// [`SessionConfig::with_bookmark_manager()`]) keeps them
    /// [causally consistent](crate#causal-consistency) with queries run through
    /// [`Driver::execute_query()`].
    pub fn execute_query_bookmark_manager(&self) -> Arc<dyn BookmarkManager> {
        Arc::clone(&self.execute_query_bookmark_manager)
    }

    /// The easiest way to run a query against the DBMS.
    ///
    /// Use the returned [`ExecuteQueryBuilder`] to configure the query and call
    /// [`ExecuteQueryBuilder::run()`] or [`ExecuteQueryBuilder::run_with_retry()`] to execute it.
    ///
    /// Internally, this spawns a session configured with [`Driver::execute_query_bookmark_manager()`]
    /// and runs the query in a managed transaction.
    /// This allows the driver to transparently apply some optimizations
    /// (e.g., skip the home database resolution round-trip when the database is known), so it's
    /// the preferred way of running queries whenever full control over sessions and transactions
    /// isn't needed.
    pub fn execute_query<Q: AsRef<str>>(
        &self,
        query: Q,
    ) -> ExecuteQueryBuilder<
        '_,
        Q,
        session::DefaultParamKey,
        session::DefaultParam,
        session::DefaultReceiver,
    > {
        ExecuteQueryBuilder::new(self, query)
    }
}

#[derive(Debug)]
pub(crate) struct ReducedDriverConfig {
    pub(crate) fetch_size: i64,
}

/// Specifies whether a piece of work should be routed to a reader or a writer in a clustered
/// (or cloud-hosted) DBMS.
///
/// **Writers** are also known as **leaders** or **primaries**.
/// **Readers** are also known as **followers** or **secondaries** as well as
/// **read replicas** or **tertiaries**.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[non_exhaustive]
pub enum RoutingControl {
    /// Route the work to a reader.
    Read,
    /// Route the work to a writer (this is the *default*).
    #[default]
    Write,
}

impl RoutingControl {
    pub(crate) fn as_protocol_str(&self) -> Option<&'static str> {
        match self {
            RoutingControl::Read => Some("r"),
            RoutingControl::Write => None,
        }
    }
}

enum ExecuteQueryBookmarkManager {
    Default,
    Custom(Arc<dyn BookmarkManager>),
    None,
}

/// Builder type to prepare a query to be run through [`Driver::execute_query()`].
///
/// Call [`ExecuteQueryBuilder::run()`] or [`ExecuteQueryBuilder::run_with_retry()`] to execute the
/// query when you're done configuring it.
pub struct ExecuteQueryBuilder<'driver, Q, KP, P, FRes> {
    driver: &'driver Driver,
    query: Q,
    _kp: PhantomData<KP>,
    param: P,
    database: Option<Arc<String>>,
    impersonated_user: Option<String>,
    session_auth: Option<Arc<auth::AuthToken>>,
    bookmark_manager: ExecuteQueryBookmarkManager,
    notification_filter: NotificationFilter,
    mode: RoutingControl,
    receiver: FRes,
}

impl<'driver, Q: AsRef<str>>
    ExecuteQueryBuilder<'driver, Q, session::DefaultParamKey, session::DefaultParam, session::DefaultReceiver>
{
    fn new(driver: &'driver Driver, query: Q) -> Self {
        Self {
            driver,
            query,
            _kp: PhantomData,
            param: Default::default(),
            database: None,
            impersonated_user: None,
            session_auth: None,
            bookmark_manager: ExecuteQueryBookmarkManager::Default,
            notification_filter: NotificationFilter::default(),
            mode: RoutingControl::Write,
            receiver: session::default_receiver,
        }
    }
}

impl<
        'driver,
        Q: AsRef<str>,
        KP: Borrow<str> + Debug,
        P: Borrow<HashMap<KP, ValueSend>>,
        R,
        FRes: FnMut(&mut RecordStream) -> Result<R>,
    > ExecuteQueryBuilder<'driver, Q, KP, P, FRes>
{
    /// Configure query parameters.
    ///
    /// Always prefer this over query string manipulation to avoid injection vulnerabilities and to
    /// allow the server to cache the query plan.
    #[inline]
    pub fn with_parameters<KP_: Borrow<str> + Debug, P_: Borrow<HashMap<KP_, ValueSend>>>(
        self,
        param: P_,
    ) -> ExecuteQueryBuilder<'driver, Q, KP_, P_, FRes> {
        let Self {
            driver,
            query,
            _kp: _,
            param: _,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver,
        } = self;
        ExecuteQueryBuilder {
            driver,
            query,
            _kp: PhantomData,
            param,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver,
        }
    }

    /// Configure the query to not use any parameters (this is the *default*).
    #[inline]
    pub fn without_parameters(
        self,
    ) -> ExecuteQueryBuilder<'driver, Q, session::DefaultParamKey, session::DefaultParam, FRes> {
        let Self {
            driver,
            query,
            _kp: _,
            param: _,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver,
        } = self;
        ExecuteQueryBuilder {
            driver,
            query,
            _kp: PhantomData,
            param: Default::default(),
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver,
        }
    }

    /// Specify the database the query should run against.
    ///
    /// While the driver is able to resolve the *home database* automatically, explicitly
    /// specifying a database where possible avoids the need for an extra round trip to find it
    /// out.
    #[inline]
    pub fn with_database(mut self, database: Arc<String>) -> Self {
        self.database = Some(database);
        self
    }

    /// Let the server choose the default database for the query (this is the *default*).
    #[inline]
    pub fn with_default_database(mut self) -> Self {
        self.database = None;
        self
    }

    /// Impersonate a user for the query.
    ///
    /// The user the [`Driver`] authenticated as needs to have the appropriate permission to do so.
    #[inline]
    pub fn with_impersonated_user(mut self, user: String) -> Self {
        self.impersonated_user = Some(user);
        self
    }

    /// Don't impersonate anyone (this is the *default*).
    #[inline]
    pub fn without_impersonated_user(mut self) -> Self {
        self.impersonated_user = None;
        self
    }

    /// Use a different auth token for this query than the one the driver was configured with.
    ///
    /// This requires the server to support session-level re-authentication.
    #[inline]
    pub fn with_session_auth(mut self, auth: Arc<auth::AuthToken>) -> Self {
        self.session_auth = Some(auth);
        self
    }

    /// Use the driver's configured auth token for this query (this is the *default*).
    #[inline]
    pub fn without_session_auth(mut self) -> Self {
        self.session_auth = None;
        self
    }

    /// Use a custom [`BookmarkManager`] instead of [`Driver::execute_query_bookmark_manager()`].
    #[inline]
    pub fn with_bookmark_manager(mut self, manager: Arc<dyn BookmarkManager>) -> Self {
        self.bookmark_manager = ExecuteQueryBookmarkManager::Custom(manager);
        self
    }

    /// Don't use a bookmark manager for this query.
    ///
    /// By default, [`Driver::execute_query_bookmark_manager()`] is used to keep all calls to
    /// [`Driver::execute_query()`] [causally consistent](crate#causal-consistency) with each other.
    #[inline]
    pub fn without_bookmark_manager(mut self) -> Self {
        self.bookmark_manager = ExecuteQueryBookmarkManager::None;
        self
    }

    /// Configure which notifications the server should send for this query.
    ///
    /// Overwrites the default configured through
    /// [`DriverConfig::with_notification_filter()`].
    #[inline]
    pub fn with_notification_filter(mut self, notification_filter: NotificationFilter) -> Self {
        self.notification_filter = notification_filter;
        self
    }

    /// Use the driver's configured notification filter for this query (this is the *default*).
    #[inline]
    pub fn without_notification_filter(mut self) -> Self {
        self.notification_filter = NotificationFilter::default();
        self
    }

    /// Specify whether the query should be sent to a reader or a writer in the cluster.
    ///
    /// Writers (*default*) can handle reads and writes.
    /// When running read-only queries, it's more efficient to send them to a reader instead, to
    /// avoid overloading the writer.
    #[inline]
    pub fn with_routing_control(mut self, mode: RoutingControl) -> Self {
        self.mode = mode;
        self
    }

    /// Specify a custom receiver to handle the result stream.
    ///
    /// By default ([`ExecuteQueryBuilder::with_default_receiver()`]), the result stream will be
    /// collected into memory and returned as [`EagerResult`].
    #[inline]
    pub fn with_receiver<R_, FRes_: FnMut(&mut RecordStream) -> Result<R_>>(
        self,
        receiver: FRes_,
    ) -> ExecuteQueryBuilder<'driver, Q, KP, P, FRes_> {
        let Self {
            driver,
            query,
            _kp,
            param,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver: _,
        } = self;
        ExecuteQueryBuilder {
            driver,
            query,
            _kp,
            param,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver,
        }
    }

    /// Set the receiver back to the default, which will collect the result stream into memory and
    /// return it as [`EagerResult`].
    #[inline]
    pub fn with_default_receiver(
        self,
    ) -> ExecuteQueryBuilder<'driver, Q, KP, P, session::DefaultReceiver> {
        let Self {
            driver,
            query,
            _kp,
            param,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver: _,
        } = self;
        ExecuteQueryBuilder {
            driver,
            query,
            _kp,
            param,
            database,
            impersonated_user,
            session_auth,
            bookmark_manager,
            notification_filter,
            mode,
            receiver: session::default_receiver,
        }
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new();
        if let Some(database) = &self.database {
            config = config.with_database(Arc::clone(database));
        }
        if let Some(user) = &self.impersonated_user {
            config = config.with_impersonated_user(user.clone());
        }
        if let Some(auth) = &self.session_auth {
            config = config.with_session_auth(Arc::clone(auth));
        }
        config = config.with_notification_filter(self.notification_filter.clone());
        config = match &self.bookmark_manager {
            ExecuteQueryBookmarkManager::Default => {
                config.with_bookmark_manager(self.driver.execute_query_bookmark_manager())
            }
            ExecuteQueryBookmarkManager::Custom(manager) => {
                config.with_bookmark_manager(Arc::clone(manager))
            }
            ExecuteQueryBookmarkManager::None => config.without_bookmark_manager(),
        };
        config
    }

    /// Run the query and return the result.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    ///
    /// use neo4j::value_map;
    ///
    /// # let driver = doc_test_utils::get_driver();
    /// let result = driver
    ///     .execute_query("CREATE (n:Actor {name: $name}) RETURN n")
    ///     .with_database(Arc::new(String::from("neo4j")))
    ///     .with_parameters(value_map!({"name": "Mark Rylance"}))
    ///     .run()
    ///     .unwrap();
    /// assert_eq!(result.records.len(), 1);
    /// ```
    pub fn run(self) -> Result<R> {
        let session_config = self.session_config();
        let Self {
            driver,
            query,
            param,
            mode,
            mut receiver,
            ..
        } = self;
        let mut session = driver.session(session_config);
        let mut result = None;
        session
            .transaction()
            .with_routing_control(mode)
            .with_api_overwrite(Some(TelemetryAPI::DriverLevel))
            .run(|tx| {
                let mut stream = tx.query(query.as_ref()).with_parameters(param.borrow()).run()?;
                result = Some(receiver(&mut stream)?);
                tx.commit()
            })?;
        Ok(result.expect("run closure always either sets result or returns an error"))
    }

    /// Run the query with a retry policy and return the result.
    ///
    /// This is pretty much the same as [`ExecuteQueryBuilder::run()`], except that the query will
    /// be retried if it fails with an error deemed retryable by the given `retry_policy`.
    /// Especially when running against a clustered or cloud-hosted DBMS, this is recommended over
    /// [`ExecuteQueryBuilder::run()`] because many intermittent errors can occur in such cases
    /// (e.g., leader switches, connections killed by load balancers, ...).
    ///
    /// See also [`RetryPolicy`].
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    ///
    /// use neo4j::retry::ExponentialBackoff;
    ///
    /// # let driver = doc_test_utils::get_driver();
    /// let result = driver
    ///     .execute_query("MATCH (n) RETURN count(n)")
    ///     .with_database(Arc::new(String::from("neo4j")))
    ///     .run_with_retry(ExponentialBackoff::default())
    ///     .unwrap();
    /// ```
    pub fn run_with_retry<RP: RetryPolicy>(
        self,
        retry_policy: RP,
    ) -> std::result::Result<R, RP::Error> {
        let session_config = self.session_config();
        let Self {
            driver,
            query,
            param,
            mode,
            mut receiver,
            ..
        } = self;
        let mut session = driver.session(session_config);
        retry_policy.execute(|| {
            let mut result = None;
            session
                .transaction()
                .with_routing_control(mode)
                .with_api_overwrite(Some(TelemetryAPI::DriverLevel))
                .run(|tx| {
                    let mut stream = tx.query(query.as_ref()).with_parameters(param.borrow()).run()?;
                    result = Some(receiver(&mut stream)?);
                    tx.commit()
                })?;
            Ok(result.expect("run closure always either sets result or returns an error"))
        })
    }
}

impl<Q: AsRef<str>, KP: Borrow<str> + Debug, P: Borrow<HashMap<KP, ValueSend>>, FRes> Debug
    for ExecuteQueryBuilder<'_, Q, KP, P, FRes>
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteQueryBuilder")
            .field("query", &self.query.as_ref())
            .field("param", &self.param.borrow())
            .field("database", &self.database)
            .field("mode", &self.mode)
            .field("receiver", &"...")
            .finish()
    }
}
