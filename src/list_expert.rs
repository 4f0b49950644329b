/// Rule list queries and toggles on top of the options store
use log::debug;

use crate::error::Result;
use crate::list_info::ListInfo;
use crate::options::OptionsStore;
use crate::url_matcher;

pub struct ListExpert<O> {
    options: O,
}

impl<O: OptionsStore> ListExpert<O> {
    pub fn new(options: O) -> Self {
        ListExpert { options }
    }

    pub fn options(&self) -> &O {
        &self.options
    }

    /// Read the current list type and patterns
    pub async fn list_info(&self) -> Result<ListInfo> {
        let is_allow_list = self.options.using_allow_list().await?;
        let patterns = self.options.rule_patterns().await?;
        Ok(ListInfo::new(is_allow_list, patterns))
    }

    /// Whether any pattern of `list` matches `url`, honoring regex mode
    pub async fn is_in_list(&self, list: &ListInfo, url: &str) -> Result<bool> {
        let use_regex = self.options.use_regex().await?;
        Ok(url_matcher::is_in_list(list.patterns(), url, use_regex))
    }

    pub async fn is_exact_match_in_list(&self, url: &str) -> Result<bool> {
        let list = self.list_info().await?;
        Ok(url_matcher::is_exact_url_in_list(list.patterns(), url))
    }

    pub async fn is_domain_in_list(&self, url: &str) -> Result<bool> {
        let list = self.list_info().await?;
        let use_regex = self.options.use_regex().await?;
        Ok(url_matcher::is_domain_in_list(list.patterns(), url, use_regex))
    }

    /// Toggle the exact page in the list; returns whether it is now listed
    ///
    /// Removing drops every entry that normalizes to the URL. Adding stores
    /// the protocol-stripped URL. An empty URL is never added.
    pub async fn add_or_remove_url_in_list(&self, url: &str) -> Result<bool> {
        let list = self.list_info().await?;
        let page = url_matcher::strip_protocol(url.trim());
        if page.is_empty() {
            debug!("Refusing to list an empty url");
            return Ok(false);
        }

        let (updated, listed) = if url_matcher::is_exact_url_in_list(list.patterns(), url) {
            let patterns = list
                .patterns()
                .iter()
                .filter(|entry| !url_matcher::urls_match(entry, url))
                .cloned()
                .collect();
            (list.with_patterns(patterns), false)
        } else {
            let mut patterns = list.patterns().to_vec();
            patterns.push(page.to_string());
            (list.with_patterns(patterns), true)
        };

        self.options.set_rule_patterns(updated.patterns()).await?;
        debug!("Page {} is {} the list", page, if listed { "now in" } else { "no longer in" });
        Ok(listed)
    }

    /// Toggle the URL's domain pattern in the list; returns whether it is now listed
    pub async fn add_or_remove_domain_in_list(&self, url: &str) -> Result<bool> {
        let list = self.list_info().await?;
        let use_regex = self.options.use_regex().await?;
        if url.trim().is_empty() {
            debug!("Refusing to list the domain of an empty url");
            return Ok(false);
        }

        let pattern = url_matcher::domain_pattern(url, use_regex);
        let (updated, listed) = if url_matcher::is_domain_in_list(list.patterns(), url, use_regex) {
            let patterns = list
                .patterns()
                .iter()
                .filter(|entry| **entry != pattern)
                .cloned()
                .collect();
            (list.with_patterns(patterns), false)
        } else {
            let mut patterns = list.patterns().to_vec();
            patterns.push(pattern.clone());
            (list.with_patterns(patterns), true)
        };

        self.options.set_rule_patterns(updated.patterns()).await?;
        debug!("Domain {} is {} the list", pattern, if listed { "now in" } else { "no longer in" });
        Ok(listed)
    }

    /// Flip between allow list and block list; returns the new `usingAllowList`
    pub async fn switch_list_type(&self) -> Result<bool> {
        let using_allow_list = !self.options.using_allow_list().await?;
        self.options.set_using_allow_list(using_allow_list).await?;
        Ok(using_allow_list)
    }
}
