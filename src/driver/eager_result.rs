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

use std::result;
use std::sync::Arc;

use super::record_stream::GetSingleRecordError;
use super::summary::Summary;
use super::Record;
use crate::value::ValueReceive;

/// A query result that has been fully collected into memory.
///
/// Returned by [`crate::driver::ExecuteQueryBuilder::run()`],
/// [`crate::driver::session::AutoCommitBuilder::run()`], and
/// [`crate::driver::record_stream::RecordStream::try_as_eager_result()`].
#[derive(Debug)]
pub struct EagerResult {
    pub keys: Vec<Arc<String>>,
    pub records: Vec<Record>,
    pub summary: Summary,
}

impl EagerResult {
    /// Turn the result into its single record.
    ///
    /// # Errors
    /// Returns [`GetSingleRecordError`] if the result doesn't contain exactly one record.
    pub fn into_single(mut self) -> result::Result<Record, GetSingleRecordError> {
        if self.records.len() > 1 {
            return Err(GetSingleRecordError::TooManyRecords);
        }
        self.records.pop().ok_or(GetSingleRecordError::NoRecords)
    }

    /// Turn the result into the single value of its single record.
    ///
    /// Returns [`None`] unless the result contains exactly one record with exactly one field.
    pub fn into_scalar(self) -> Option<ValueReceive> {
        let mut record = self.into_single().ok()?;
        record.into_values().next()
    }
}
