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

/// Default exclude patterns offered to callers who haven't configured
/// their own, avoiding common spider traps (static assets, admin panels,
/// print/share links, date-paginated archives).
pub fn get_default_exclude_patterns() -> Vec<String> {
    vec![
        r"\.(?:css|js|ico|png|jpg|jpeg|gif|svg|woff|woff2|ttf|eot)$".to_string(),
        r"/(?:wp-admin|admin|login|logout|register)/".to_string(),
        r"\?(?:.*&)?(?:print|share|email)=".to_string(),
        r"\.(?:pdf|doc|docx|xls|xlsx|ppt|pptx|zip|rar|tar|gz)$".to_string(),
        r"/(?:calendar|search|tag|category)/".to_string(),
        r"\?(?:.*&)?(?:year|month|day)=\d+".to_string(),
        r"#".to_string(),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use regex::Regex;

    #[test]
    fn all_default_patterns_compile() {
        for pattern in get_default_exclude_patterns() {
            Regex::new(&pattern).unwrap_or_else(|e| panic!("{pattern}: {e}"));
        }
    }
}
