use crate::hostgroup::types::{ConfigEntry, HostGroupType};

/// Edit handle for one group's entries inside its type's shared config.
pub struct HostGroup<'t> {
    hgt: &'t mut HostGroupType,
    name: String,
}

impl<'t> HostGroup<'t> {
    pub(crate) fn new(hgt: &'t mut HostGroupType, name: &str) -> Self {
        Self {
            hgt,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn positions(&self) -> Vec<usize> {
        self.hgt
            .config
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name == self.name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Add `cidrs` to this group and return its resulting CIDR list.
    ///
    /// With `keep_together` and existing entries, new entries go directly
    /// before the group's first entry (`prepend`) or after its last.
    /// Otherwise they go to the front or back of the whole config.
    /// `replace` drops the group's current entries first, keeping the
    /// position they determined.
    pub fn add(&mut self, cidrs: &[&str], prepend: bool, keep_together: bool, replace: bool) -> Vec<String> {
        let existing = self.positions();
        let mut pos = match (keep_together, existing.first(), existing.last()) {
            (true, Some(first), _) if prepend => *first,
            (true, _, Some(last)) => last + 1,
            _ if prepend => 0,
            _ => self.hgt.config.len(),
        };

        if replace {
            pos -= existing.iter().filter(|i| **i < pos).count();
            let name = &self.name;
            self.hgt.config.retain(|e| &e.name != name);
        }

        for (offset, cidr) in cidrs.iter().enumerate() {
            self.hgt.config.insert(pos + offset, ConfigEntry::new(cidr, &self.name));
        }
        self.get()
    }

    /// Remove the listed CIDRs from this group only.
    pub fn remove(&mut self, cidrs: &[&str]) -> Vec<String> {
        let name = &self.name;
        self.hgt
            .config
            .retain(|e| !(&e.name == name && cidrs.contains(&e.cidr.as_str())));
        self.get()
    }

    /// Remove every entry of this group.
    pub fn clear(&mut self) {
        let name = &self.name;
        self.hgt.config.retain(|e| &e.name != name);
    }

    pub fn get(&self) -> Vec<String> {
        self.hgt
            .config
            .iter()
            .filter(|e| e.name == self.name)
            .map(|e| e.cidr.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{connect, scripted};
    use crate::profiler::NetProfiler;

    fn ten_groups(profiler: &NetProfiler) -> HostGroupType {
        let mut hgt = HostGroupType::create(profiler, "TestType", false, "");
        for i in 0..10 {
            let cidr = format!("10.9{}.11.0/24", i);
            hgt.group(&format!("Test{}", i)).add(&[&cidr], false, true, false);
        }
        hgt
    }

    fn cidrs(hgt: &HostGroupType) -> Vec<&str> {
        hgt.config.iter().map(|e| e.cidr.as_str()).collect()
    }

    #[test]
    fn test_keep_together_append() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut hgt = ten_groups(&profiler);
        hgt.group("Test4").add(&["10.10.21.0/24"], false, true, false);
        assert_eq!(hgt.group("Test4").get(), vec!["10.94.11.0/24", "10.10.21.0/24"]);
        assert_eq!(cidrs(&hgt)[5], "10.10.21.0/24");
        assert_eq!(cidrs(&hgt)[6], "10.95.11.0/24");

        let last = hgt.group("Test9").add(&["10.10.22.0/24"], false, true, false);
        assert_eq!(last[1], "10.10.22.0/24");
    }

    #[test]
    fn test_keep_together_prepend() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut hgt = ten_groups(&profiler);
        hgt.group("Test3").add(&["10.10.21.0/24"], true, true, false);
        assert_eq!(hgt.group("Test3").get()[0], "10.10.21.0/24");
        assert_eq!(cidrs(&hgt)[2], "10.92.11.0/24");
        assert_eq!(cidrs(&hgt)[3], "10.10.21.0/24");
    }

    #[test]
    fn test_front_and_back_without_keep_together() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut hgt = ten_groups(&profiler);
        hgt.group("Test5").add(&["10.1.0.0/16"], true, false, false);
        hgt.group("Test5").add(&["10.2.0.0/16"], false, false, false);
        assert_eq!(cidrs(&hgt).first(), Some(&"10.1.0.0/16"));
        assert_eq!(cidrs(&hgt).last(), Some(&"10.2.0.0/16"));

        let mut fresh = HostGroupType::create(&profiler, "Other", false, "");
        fresh.group("A").add(&["1.0.0.0/8"], false, true, false);
        fresh.group("B").add(&["2.0.0.0/8", "3.0.0.0/8"], true, true, false);
        assert_eq!(cidrs(&fresh), vec!["2.0.0.0/8", "3.0.0.0/8", "1.0.0.0/8"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut hgt = ten_groups(&profiler);
        hgt.group("Test9").add(&["10.10.21.0/24"], false, true, true);
        assert_eq!(hgt.group("Test9").get(), vec!["10.10.21.0/24"]);

        hgt.group("Test2").add(&["10.10.30.0/24"], false, true, true);
        assert_eq!(cidrs(&hgt)[2], "10.10.30.0/24");
        assert_eq!(hgt.config.len(), 10);
    }

    #[test]
    fn test_remove_only_touches_own_group() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let mut hgt = ten_groups(&profiler);
        hgt.group("Test9").add(&["10.10.21.0/24"], false, true, false);
        hgt.group("Test8").add(&["10.10.21.0/24"], false, true, false);
        hgt.group("Test9").remove(&["10.10.21.0/24"]);

        assert_eq!(hgt.group("Test9").get(), vec!["10.99.11.0/24"]);
        assert_eq!(hgt.group("Test8").get()[1], "10.10.21.0/24");

        hgt.group("Test8").clear();
        assert!(hgt.group("Test8").get().is_empty());
        assert!(hgt.has_group("Test8"));
    }
}
