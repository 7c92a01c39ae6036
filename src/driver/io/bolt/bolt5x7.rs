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

// Bolt 5.7 reuses Bolt 5.0's wire-level struct encoding; only message shape and
// handshake/session semantics differ, which protocol.rs implements.
mod protocol;

pub(crate) use protocol::Bolt5x7;
pub(crate) use super::bolt5x0::Bolt5x0StructTranslator as Bolt5x7StructTranslator;
