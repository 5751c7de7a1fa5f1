// Copyright 2024. Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::url_canon::glob_match;

/// Strips `; charset=...` and other parameters, lower-cases, and tests
/// against `allowed` patterns (`*` wildcard).
pub fn is_content_type_allowed(content_type: &str, allowed: &[String]) -> bool {
    if content_type.is_empty() {
        return false;
    }
    let main_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    allowed
        .iter()
        .any(|pattern| glob_match(&main_type, &pattern.to_ascii_lowercase()))
}

/// Same rule, used for the asset capture type allow-list.
pub fn is_asset_type_allowed(content_type: &str, allowed: &[String]) -> bool {
    is_content_type_allowed(content_type, allowed)
}
