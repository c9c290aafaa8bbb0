// Static audit: scans every source file for tracing calls that would put
// patient data into logs. Report file names are PHI too: the filing
// convention embeds the fiscal code and the patient's name.
